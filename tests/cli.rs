use assert_cmd::prelude::*;
use glam::Vec3;
use once_cell::sync::Lazy;
use predicates::str::contains;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

use retro3d_runtime::records::RecordWriter;
use retro3d_runtime::{FourCC, ResourceForkWriter};

const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

fn name_field(name: &str) -> [u8; 32] {
    let mut field = [0u8; 32];
    field[..name.len()].copy_from_slice(name.as_bytes());
    field
}

static SKELETON: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut fork = ResourceForkWriter::new();
    fork.add(
        FourCC::new(b"Hedr"),
        1000,
        None,
        RecordWriter::new().i16(0x0110).i16(1).i16(1).i16(0).finish(),
    );
    fork.add(
        FourCC::new(b"Bone"),
        1000,
        None,
        RecordWriter::new()
            .i32(-1)
            .bytes(&name_field("Body"))
            .vec3(Vec3::ZERO)
            .u16(3)
            .u16(1)
            .zeros(32)
            .finish(),
    );
    fork.add(
        FourCC::new(b"BonP"),
        1000,
        None,
        RecordWriter::new().u16(0).u16(1).u16(2).finish(),
    );
    fork.add(FourCC::new(b"BonN"), 1000, None, RecordWriter::new().u16(0).finish());
    fork.add(
        FourCC::new(b"RelP"),
        1000,
        None,
        RecordWriter::new()
            .vec3(Vec3::ZERO)
            .vec3(Vec3::X)
            .vec3(Vec3::Y)
            .finish(),
    );
    fork.add(
        FourCC::new(b"AnHd"),
        1000,
        None,
        RecordWriter::new()
            .u8(4)
            .bytes(&name_field("Idle"))
            .u8(0)
            .i16(0)
            .finish(),
    );
    fork.add(FourCC::new(b"NumK"), 1000, None, vec![1]);
    fork.add(
        FourCC::new(b"KeyF"),
        1000,
        None,
        RecordWriter::new()
            .i32(30)
            .i32(0)
            .vec3(Vec3::ZERO)
            .vec3(Vec3::ZERO)
            .vec3(Vec3::ONE)
            .finish(),
    );
    fork.to_bytes()
});

static PLAYFIELD: Lazy<Vec<u8>> = Lazy::new(|| {
    const SIZE: i32 = 5;
    let tiles = (SIZE * SIZE) as usize;
    let vertices = ((SIZE + 1) * (SIZE + 1)) as usize;

    let mut fork = ResourceForkWriter::new();
    fork.add(
        FourCC::new(b"Hedr"),
        1000,
        None,
        RecordWriter::new()
            .u8(1)
            .u8(0)
            .u8(0x80)
            .u8(0)
            .i32(0)
            .i32(SIZE)
            .i32(SIZE)
            .i32(1)
            .i32(1)
            .f32(160.0)
            .f32(0.0)
            .f32(0.0)
            .i32(1)
            .i32(0)
            .finish(),
    );
    fork.add(FourCC::new(b"Timg"), 1000, None, vec![0; 8]);
    fork.add(FourCC::new(b"Xlat"), 1000, None, RecordWriter::new().i16(0).finish());
    fork.add(FourCC::new(b"Layr"), 1000, None, vec![0; tiles * 2]);
    fork.add(FourCC::new(b"YCrd"), 1000, None, vec![0; vertices * 4]);
    fork.add(FourCC::new(b"Vcol"), 1000, None, vec![0; vertices * 2]);
    fork.add(FourCC::new(b"Splt"), 1000, None, vec![0; tiles]);
    fork.add(FourCC::new(b"Itms"), 1000, None, Vec::new());
    fork.add(
        FourCC::new(b"Spln"),
        1000,
        None,
        RecordWriter::new()
            .i16(0)
            .i32(0)
            .i32(0)
            .i32(0)
            .i16(0)
            .i32(0)
            .zeros(8)
            .finish(),
    );
    fork.to_bytes()
});

fn data_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("Ant.skeleton"), &*SKELETON).expect("write skeleton");
    std::fs::write(dir.path().join("Ant.obj"), TRIANGLE_OBJ).expect("write model");
    std::fs::write(dir.path().join("Level1.ter"), &*PLAYFIELD).expect("write playfield");
    dir
}

fn runtime(file: &Path) -> Command {
    let mut cmd = Command::cargo_bin("retro3d-runtime").expect("binary exists");
    cmd.arg(file);
    cmd
}

#[test]
fn cli_summarises_skeleton() {
    let dir = data_dir();
    runtime(&dir.path().join("Ant.skeleton"))
        .assert()
        .success()
        .stdout(contains("Loaded skeleton with 1 bones, 1 animations"))
        .stdout(contains(" - bone Body (root, 3 points)"))
        .stdout(contains(" - anim Idle: 0 event(s), 30 tick(s)"));
}

#[test]
fn cli_explodes_reference_model() {
    let dir = data_dir();
    runtime(&dir.path().join("Ant.skeleton"))
        .args(["--explode", "1", "--ticks", "10", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Exploded into 1 shard(s)"))
        .stdout(contains("After 10 tick(s):"));
}

#[test]
fn cli_summarises_playfield_with_empty_spline() {
    let dir = data_dir();
    runtime(&dir.path().join("Level1.ter"))
        .assert()
        .success()
        .stdout(contains("Loaded playfield 5x5 tiles (0 items, 1 splines, 0 fences)"))
        .stdout(contains(" - spline 0: 0 point(s), 0 item(s)"));
}

#[test]
fn cli_reports_missing_ceiling_layers() {
    let dir = data_dir();
    runtime(&dir.path().join("Level1.ter"))
        .arg("--ceiling")
        .assert()
        .failure()
        .stderr(contains("Error:"))
        .stderr(contains("Layr"));
}

#[test]
fn cli_rejects_reference_mismatch() {
    let dir = data_dir();
    let model = dir.path().join("Quad.obj");
    std::fs::write(&model, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").expect("write model");
    runtime(&dir.path().join("Ant.skeleton"))
        .arg("--reference")
        .arg(&model)
        .assert()
        .failure()
        .stderr(contains("# of points in reference model has changed"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let dir = data_dir();
    runtime(&dir.path().join("Ant.skeleton"))
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}
