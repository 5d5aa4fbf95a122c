use clap::Parser;

use mzthresholder::{MZThresholder, OutputFormat, RunPeaks};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("peaks.json");

    let args = MZThresholder::parse_from([
        "mzthresholder",
        "--config-file",
        "tests/data/detect.toml",
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(args.input_files.is_empty());

    let driver = args.configured().unwrap();
    assert_eq!(driver.input_files.len(), 1);
    assert_eq!(driver.ms_level, 2);
    assert_eq!(driver.noise_level, 20.0);
    assert_eq!(driver.minimum_peak_height, 50.0);
    // Untouched by the configuration file
    assert_eq!(driver.int_tolerance, 0.15);
    assert_eq!(driver.output_file, output);
    assert_eq!(driver.output_format().unwrap(), (OutputFormat::Json, false));

    driver.main().unwrap();

    let runs: Vec<RunPeaks> =
        serde_json::from_reader(std::fs::File::open(&output).unwrap()).unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].source.ends_with("small_run.mgf"));
    let peaks = &runs[0].peaks;
    assert_eq!(peaks.len(), 1);
    assert_eq!(peaks[0].id, 1);
    assert_eq!(peaks[0].mz, 100.0);
    assert_eq!(peaks[0].time, 2.0);
    assert_eq!(peaks[0].points.len(), 1);
}

#[test_log::test]
fn test_time_range_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("peaks.tsv");

    let args = MZThresholder::parse_from([
        "mzthresholder",
        "tests/data/small_run.mgf",
        "-L",
        "2",
        "-n",
        "20",
        "-r",
        "2.5-",
        "-o",
        output.to_str().unwrap(),
    ]);
    let driver = args.configured().unwrap();
    assert_eq!(driver.time_range.unwrap().start, 2.5);
    assert_eq!(driver.time_range.unwrap().end, f64::INFINITY);
    driver.main().unwrap();

    // The only intense point is at 2 minutes, so only the header is written
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.lines().count() <= 1);
}
