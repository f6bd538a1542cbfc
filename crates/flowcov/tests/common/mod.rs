use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fake `flow` executable. `status --json` reports a healthy tool;
/// `coverage --json <file>` answers per file basename.
const FAKE_FLOW: &str = r#"#!/bin/sh
if [ "$1" = "status" ]; then
  echo '{"passed":true,"flowVersion":"0.57.3","errors":[]}'
  exit 0
fi
case "$3" in
  *main.js)
    echo '{"expressions":{"covered_count":10,"uncovered_count":0,"uncovered_locs":[]}}'
    ;;
  *util.js)
    echo '{"expressions":{"covered_count":5,"uncovered_count":5,"uncovered_locs":[{"start":{"line":4,"column":1,"offset":50,"source":"'"$3"'"},"end":{"line":4,"column":8,"offset":57,"source":"'"$3"'"}}]}}'
    ;;
  *legacy.js)
    echo '{"expressions":{"covered_count":4,"uncovered_count":6,"uncovered_locs":[]}}'
    ;;
  *weak.js)
    echo '{"expressions":{"covered_count":3,"uncovered_count":1,"uncovered_locs":[]}}'
    ;;
  *quote.js)
    echo '{"expressions":{"covered_count":2,"uncovered_count":0,"uncovered_locs":[]}}'
    ;;
  *broken.js)
    echo 'flow produced garbage'
    ;;
  *)
    echo '{"expressions":{"covered_count":1,"uncovered_count":1,"uncovered_locs":[]}}'
    ;;
esac
"#;

pub struct TestProject {
    pub dir: tempfile::TempDir,
    pub flow: PathBuf,
}

impl TestProject {
    /// A project with one @flow, one @flow weak and one unannotated file.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.js"), "// @flow\nconst main = 1;\n").unwrap();
        std::fs::write(src.join("util.js"), "// @flow\nconst util = 2;\n").unwrap();
        std::fs::write(src.join("legacy.js"), "const legacy = 3;\n").unwrap();

        let flow = dir.path().join("fake-flow");
        std::fs::write(&flow, FAKE_FLOW).unwrap();
        std::fs::set_permissions(&flow, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, flow }
    }

    pub fn add_file(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join(name), content).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn flow_path(&self) -> String {
        self.flow.to_string_lossy().to_string()
    }
}

pub fn flowcov_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_flowcov"))
}

/// `flowcov report` against the project with common flags applied.
pub fn report_cmd(project: &TestProject, extra: &[&str]) -> Command {
    let mut cmd = flowcov_cmd();
    cmd.arg("report")
        .arg(project.path())
        .args(["-i", "src/*.js"])
        .args(["--flow-command-path", &project.flow_path()])
        .arg("--no-config")
        .args(extra);
    cmd
}
