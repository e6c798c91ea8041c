//! Integration tests driving the pipelines end to end with fake engine
//! executables, so no CadQuery or OpenSCAD installation is required.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cadpipe_core::pipeline::cadquery::ExportFormat;
use cadpipe_core::pipeline::openscad::ScadFormat;
use cadpipe_core::{CadQueryPipeline, EngineConfig, EngineError, ManifoldStatus, OpenscadPipeline};

/// Write an executable fake engine script into `dir`.
fn fake_engine(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write fake engine");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake engine");
    path
}

/// Binary STL buffer containing a single triangle spanning the given extents.
fn synthetic_stl(max: [f32; 3]) -> Vec<u8> {
    let mut data = vec![0u8; 80];
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&[0u8; 12]); // normal
    let vertices = [[0.0, 0.0, 0.0], [max[0], max[1], 0.0], [max[0], 0.0, max[2]]];
    for vertex in vertices {
        for component in vertex {
            data.extend_from_slice(&f32::to_le_bytes(component));
        }
    }
    data.extend_from_slice(&[0u8; 2]);
    data
}

fn config_with(scratch: &Path, python: &Path, openscad: Option<&Path>) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scratch_dir = scratch.to_path_buf();
    config.python_path = python.to_string_lossy().to_string();
    if let Some(openscad) = openscad {
        config.openscad_path = openscad.to_string_lossy().to_string();
    }
    config
}

fn scratch_leftovers(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(prefix))
                    .unwrap_or(false)
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_execute_captures_output_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "fake-python", "echo hello from engine");
    let config = config_with(&tmp.path().join("scratch"), &engine, None);
    let pipeline = CadQueryPipeline::new(config.clone());

    let response = pipeline.execute("result = 1").await.expect("execute");
    assert!(response.success);
    assert!(response.stdout.contains("hello from engine"));
    assert!(response.errors.is_empty());

    // Transient script released after the run.
    assert!(scratch_leftovers(&config.scratch_dir, "script_").is_empty());
}

#[tokio::test]
async fn test_execute_failure_is_structured_not_err() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-python",
        "echo \"Error: something broke\" >&2\nexit 3",
    );
    let config = config_with(&tmp.path().join("scratch"), &engine, None);
    let pipeline = CadQueryPipeline::new(config);

    let response = pipeline.execute("result = 1").await.expect("execute");
    assert!(!response.success);
    assert_eq!(response.errors, vec!["Error: something broke".to_string()]);
    assert!(response.stderr.contains("something broke"));
}

#[tokio::test]
async fn test_missing_engine_binary_is_hard_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_dir = tmp.path().join("scratch");
    config.python_path = "cadpipe-no-such-engine".to_string();
    let pipeline = CadQueryPipeline::new(config.clone());

    let result = pipeline.execute("result = 1").await;
    assert!(matches!(result, Err(EngineError::Spawn { .. })));

    // Transient input still released on the error path.
    assert!(scratch_leftovers(&config.scratch_dir, "script_").is_empty());
}

#[tokio::test]
async fn test_validate_with_marker_emitting_engine() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-python",
        "echo \"BBOX:-10.00,-7.50,-5.00,10.00,7.50,5.00\"\n\
         echo \"SIZE:20.00x15.00x10.00\"\n\
         echo \"VOLUME:2972.47\"",
    );
    let config = config_with(&tmp.path().join("scratch"), &engine, None);
    let pipeline = CadQueryPipeline::new(config);

    let response = pipeline.validate("result = box").await.expect("validate");
    assert!(response.valid);
    let bbox = response.bounding_box.expect("bbox present");
    assert!((bbox.size.x - 20.0).abs() < 0.1);
    assert!((bbox.size.y - 15.0).abs() < 0.1);
    assert!((bbox.size.z - 10.0).abs() < 0.1);
    assert!(response.volume_mm3.unwrap() > 0.0);
}

#[tokio::test]
async fn test_validate_degenerate_geometry_is_invalid() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-python",
        "echo \"BBOX:0.00,0.00,0.00,20.00,15.00,0.00\"\n\
         echo \"SIZE:20.00x15.00x0.00\"\n\
         echo \"VOLUME:0.00\"",
    );
    let config = config_with(&tmp.path().join("scratch"), &engine, None);
    let pipeline = CadQueryPipeline::new(config);

    let response = pipeline.validate("result = sketch").await.expect("validate");
    assert!(!response.valid);
    assert!(response.bounding_box.is_some());
}

#[tokio::test]
async fn test_export_reports_formats_independently() {
    let tmp = tempfile::tempdir().unwrap();
    // Creates only the declared .step output, leaving .stl missing, then
    // prints the measurement markers.
    let engine = fake_engine(
        tmp.path(),
        "fake-python",
        r#"for p in $(grep -o '"/[^"]*\.step"' "$1" | tr -d '"'); do : > "$p"; done
echo "BBOX:0.00,0.00,0.00,10.00,10.00,10.00"
echo "SIZE:10.00x10.00x10.00"
echo "VOLUME:1000.00""#,
    );
    let config = config_with(&tmp.path().join("scratch"), &engine, None);
    let pipeline = CadQueryPipeline::new(config.clone());

    let response = pipeline
        .export("result = box", &[ExportFormat::Step, ExportFormat::Stl], None)
        .await
        .expect("export");

    assert!(response.success);
    assert!(response.files.contains_key("step"));
    assert!(!response.files.contains_key("stl"));
    let step_path = &response.files["step"];
    assert!(step_path.exists(), "retained export must stay on disk");
    assert!(response.bounding_box.is_some());

    // Input script transient, exported file retained.
    assert!(scratch_leftovers(&config.scratch_dir, "script_").is_empty());
}

#[tokio::test]
async fn test_timeout_yields_structured_failure_in_bounded_time() {
    let tmp = tempfile::tempdir().unwrap();
    // The backgrounded sleep inherits the output pipes and survives the
    // kill, so the runner must return without waiting for pipe EOF.
    let engine = fake_engine(tmp.path(), "fake-python", "sleep 30 & sleep 30");
    let mut config = config_with(&tmp.path().join("scratch"), &engine, None);
    config.script_timeout = Duration::from_millis(300);
    let pipeline = CadQueryPipeline::new(config);

    let start = Instant::now();
    let response = pipeline.execute("result = 1").await.expect("execute");
    assert!(!response.success);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_openscad_render_decodes_compiled_stl() {
    let tmp = tempfile::tempdir().unwrap();
    let fixture = tmp.path().join("fixture.stl");
    std::fs::write(&fixture, synthetic_stl([10.0, 10.0, 10.0])).unwrap();
    // Invoked as: -o <out> --export-format binstl <input>; $2 is the output.
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        &format!("cp \"{}\" \"$2\"", fixture.display()),
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config.clone());

    let response = pipeline
        .render("cube([10,10,10]);", None)
        .await
        .expect("render");

    assert!(response.success);
    let stl_path = response.stl_path.expect("stl path");
    assert!(stl_path.exists(), "rendered STL is retained");
    assert!(response.file_size_bytes > 0);
    let bbox = response.bounding_box.expect("bbox decoded");
    assert_eq!(bbox.size.x, 10.0);
    assert_eq!(bbox.size.y, 10.0);
    assert_eq!(bbox.size.z, 10.0);

    // Transient .scad input released.
    assert!(scratch_leftovers(&config.scratch_dir, "model_").is_empty());
}

#[tokio::test]
async fn test_openscad_compile_error_reports_no_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        "echo \"ERROR: Parser error in line 1: syntax error\" >&2\nexit 1",
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config);

    let response = pipeline.render("cube([10,10,10]", None).await.expect("render");
    assert!(!response.success);
    assert!(!response.errors.is_empty());
    assert!(response.stl_path.is_none());
    assert!(response.bounding_box.is_none());
}

#[tokio::test]
async fn test_openscad_validate_sane_mesh() {
    let tmp = tempfile::tempdir().unwrap();
    let fixture = tmp.path().join("fixture.stl");
    std::fs::write(&fixture, synthetic_stl([10.0, 10.0, 10.0])).unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        &format!("cp \"{}\" \"$2\"", fixture.display()),
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config.clone());

    let response = pipeline.validate("cube([10,10,10]);").await.expect("validate");
    assert!(response.valid);
    assert!(response.compile_success);
    assert_eq!(response.manifold, ManifoldStatus::LikelyManifold);
    assert_eq!(response.triangle_count, 1);
    assert!(response.bounding_box.is_some());

    // Probe STL is transient in the validate operation.
    assert!(scratch_leftovers(&config.scratch_dir, "validate_").is_empty());
}

#[tokio::test]
async fn test_openscad_validate_empty_mesh_is_valid() {
    let tmp = tempfile::tempdir().unwrap();
    // A header-only STL with zero triangles, as the compiler emits for
    // empty geometry. The artifact is readable, so the manifold heuristic
    // still runs against the clean stderr; only the metrics stay absent.
    let fixture = tmp.path().join("fixture.stl");
    let mut empty = vec![0u8; 80];
    empty.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&fixture, empty).unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        &format!("cp \"{}\" \"$2\"", fixture.display()),
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config);

    let response = pipeline.validate("union();").await.expect("validate");
    assert!(response.valid);
    assert!(response.compile_success);
    assert_eq!(response.manifold, ManifoldStatus::LikelyManifold);
    assert_eq!(response.triangle_count, 0);
    assert!(response.bounding_box.is_none());
    assert_eq!(response.file_size_bytes, 84);
}

#[tokio::test]
async fn test_openscad_validate_flags_oversized_mesh() {
    let tmp = tempfile::tempdir().unwrap();
    let fixture = tmp.path().join("fixture.stl");
    std::fs::write(&fixture, synthetic_stl([600.0, 10.0, 10.0])).unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        &format!("cp \"{}\" \"$2\"", fixture.display()),
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config);

    let response = pipeline.validate("cube([600,10,10]);").await.expect("validate");
    assert!(!response.valid);
    assert!(response.compile_success, "compile result is unaffected");
    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("Large dimension")));
}

#[tokio::test]
async fn test_openscad_validate_non_manifold_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    let fixture = tmp.path().join("fixture.stl");
    std::fs::write(&fixture, synthetic_stl([10.0, 10.0, 10.0])).unwrap();
    let engine = fake_engine(
        tmp.path(),
        "fake-openscad",
        &format!(
            "echo \"WARNING: Object may not be a valid 2-manifold\" >&2\ncp \"{}\" \"$2\"",
            fixture.display()
        ),
    );
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config);

    let response = pipeline.validate("union();").await.expect("validate");
    assert!(!response.valid);
    assert_eq!(response.manifold, ManifoldStatus::NonManifold);
}

#[tokio::test]
async fn test_openscad_export_missing_output_is_not_success() {
    let tmp = tempfile::tempdir().unwrap();
    // Exits cleanly but writes nothing, e.g. empty generated geometry.
    let engine = fake_engine(tmp.path(), "fake-openscad", "exit 0");
    let config = config_with(&tmp.path().join("scratch"), Path::new("python3"), Some(&engine));
    let pipeline = OpenscadPipeline::new(config);

    let response = pipeline
        .export("cube([0,0,0]);", ScadFormat::Stl, None)
        .await
        .expect("export");
    assert!(!response.success);
    assert!(response.output_path.is_none());
    assert_eq!(response.file_size_bytes, 0);
}
