#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use drift_compare::{data::Value, rows::RawRow};
use tempfile::{TempDir, tempdir};

/// Worker mapping shared by the integration tests.
pub const WORKER_MAPPING: &str = r#"
tables:
  - left_table: dev.worker
    right_table: prod.worker
    fields:
      - { left_field: emp_id, right_field: employee_id, is_key: true }
      - { left_field: name, right_field: full_name }
      - { left_field: salary, right_field: base_pay, kind: decimal }
  - left_table: dev.job
    right_table: prod.job
    fields:
      - { left_field: job_code, right_field: code }
"#;

/// Scratch directory with a `left/` and a `right/` environment, cleaned up on
/// drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        fs::create_dir(temp_dir.path().join("left")).expect("create left dir");
        fs::create_dir(temp_dir.path().join("right")).expect("create right dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn left_dir(&self) -> PathBuf {
        self.path().join("left")
    }

    pub fn right_dir(&self) -> PathBuf {
        self.path().join("right")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn write_left(&self, table: &str, contents: &str) -> PathBuf {
        self.write(&format!("left/{table}.csv"), contents)
    }

    pub fn write_right(&self, table: &str, contents: &str) -> PathBuf {
        self.write(&format!("right/{table}.csv"), contents)
    }

    /// Worker tables where Bob's pay differs, Carol exists only on the left
    /// and Dan only on the right.
    pub fn with_worker_tables(self) -> Self {
        self.write(
            "left/dev.worker.csv",
            "emp_id,name,salary,legacy_code\n1,Alice,100.001,A\n2,Bob,90,B\n3,Carol,70,C\n",
        );
        self.write(
            "right/prod.worker.csv",
            "employee_id,full_name,base_pay\n1,Alice ,100.00\n2,Bob,95\n4,Dan,60\n",
        );
        self
    }

    pub fn mapping(&self) -> PathBuf {
        self.write("mapping.yaml", WORKER_MAPPING)
    }
}

/// Row with string values, one per `(column, value)` pair.
pub fn row(pairs: &[(&str, &str)]) -> RawRow {
    RawRow::from_pairs(pairs.iter().map(|(k, v)| (*k, Value::from(*v))))
}
