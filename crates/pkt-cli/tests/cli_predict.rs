use statrs::distribution::{ContinuousCDF, Gamma};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pktstat"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("pktstat_cli_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "command failed, stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

/// Run 0: 2000 packets whose rescaled energies follow Gamma(1.5, 60), with
/// frequencies spread evenly over `[1e14, 1e15)`, plus one packet at the
/// energy scale. Run 1 is a stub.
fn write_packets() -> PathBuf {
    let g = Gamma::new(1.5, 60.0).unwrap();
    let m = 2000;
    let mut energies: Vec<f64> = (0..m)
        .map(|i| {
            let u = ((i * 7919) % m) as f64 + 0.5;
            1.0 - g.inverse_cdf(u / m as f64)
        })
        .collect();
    let mut nus: Vec<f64> = (0..m).map(|i| 1e14 + 9e14 * i as f64 / m as f64).collect();
    energies.push(1.0);
    nus.push(9.999e14);
    let doc = serde_json::json!({
        "energies": [energies, [1.0, 2.0]],
        "nus": [nus, [1e14, 2e14]],
    });
    let path = tmp_path("packets.json");
    std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
    path
}

#[test]
fn fit_reports_mode_and_evidence() {
    let input = write_packets();
    let out = run(&["fit", "--input", input.to_str().unwrap()]);
    let v = stdout_json(&out);

    let names = v["parameter_names"].as_array().unwrap();
    assert_eq!(names.len(), 2);
    let bestfit = v["bestfit"].as_array().unwrap();
    assert_eq!(bestfit.len(), names.len());
    let alpha0 = bestfit[0].as_f64().unwrap();
    let beta0 = bestfit[1].as_f64().unwrap();
    assert!((alpha0 - 1.5).abs() < 0.15, "alpha0 = {alpha0}");
    assert!((beta0 - 60.0).abs() < 8.0, "beta0 = {beta0}");
    assert!(v["log_evidence"].as_f64().unwrap().is_finite());
    assert_eq!(v["n_packets"].as_u64(), Some(2001));

    let _ = std::fs::remove_file(input);
}

#[test]
fn sum_x_counts_half_open_bin() {
    let input = write_packets();
    // frequencies are 1e14 + 4.5e11 * i; [1e14, 1e14 + 4.5e12) holds i = 0..10
    let out = run(&[
        "sum-x",
        "--input",
        input.to_str().unwrap(),
        "--numin",
        "1e14",
        "--numax",
        "1.045e14",
    ]);
    let v = stdout_json(&out);
    assert_eq!(v["n"].as_u64(), Some(10));
    let x = v["x"].as_f64().unwrap();
    assert!(x > 0.0 && x < 10.0 * 0.2, "x = {x}");

    let _ = std::fs::remove_file(input);
}

#[test]
fn predict_in_each_mode() {
    let input = write_packets();
    let path = input.to_str().unwrap();
    let bin = ["--numin", "5e14", "--numax", "5.0225e14"];

    for mode in ["small", "medium", "very-large"] {
        let mut args = vec!["predict", "--input", path, "--mode", mode];
        args.extend_from_slice(&bin);
        let v = stdout_json(&run(&args));
        assert_eq!(v["n"].as_u64(), Some(5), "mode {mode}");
        let value = v["value"].as_f64().unwrap();
        assert!(value.is_finite() && value >= 0.0, "mode {mode}: value {value}");
        if mode == "small" {
            assert!(v["n_calls"].as_u64().unwrap() >= 2);
        }
    }

    let _ = std::fs::remove_file(input);
}

#[test]
fn rejects_missing_run() {
    let input = write_packets();
    let out = run(&["fit", "--input", input.to_str().unwrap(), "--run", "5"]);
    assert!(!out.status.success());
    let _ = std::fs::remove_file(input);
}
