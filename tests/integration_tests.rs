use eegband::doctest_utils::{write_recording, write_sine_recording, DROPOUT_EVERY};
use eegband::pipeline::{run_correlation, run_time_course, run_topomap};
use eegband::{plot, AnalysisConfig, BandError, Granularity, Pipeline, SignalLoader};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

const FS: f64 = 256.0;

// 两个正弦分量的混合信号
fn write_mixture(path: &Path, theta_amp: f64, alpha_amp: f64, seconds: f64) {
    write_recording(path, FS, seconds, |ch, t| {
        let phase = ch as f64 * 0.3;
        800.0
            + theta_amp * (2.0 * PI * 5.0 * t + phase).sin()
            + alpha_amp * (2.0 * PI * 10.0 * t + phase).sin()
    })
    .unwrap();
}

#[test]
fn test_zero_rows_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.csv");
    write_sine_recording(&path, 5.0, 10.0, FS).unwrap();

    let recording = SignalLoader::from_config(&AnalysisConfig::time_course())
        .load(&path)
        .unwrap();

    assert_eq!(recording.n_samples(), 2560);
    assert_eq!(recording.rows_dropped, 2560 / DROPOUT_EVERY);
    assert_eq!(recording.rows_read, recording.n_samples() + recording.rows_dropped);
    assert!(recording.data.iter().all(|&v| v != 0.0));

    // 时间戳跨度约为 10 秒
    let span = recording.wall_clock_secs().unwrap();
    assert!((span - 10.0).abs() < 0.01, "span {}", span);
}

#[test]
fn test_missing_channels_are_all_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.csv");
    fs::write(&path, "TimeStamp,TP9,AF8\n2025-05-03 22:05:03.000,1,2\n").unwrap();

    match SignalLoader::from_config(&AnalysisConfig::time_course()).load(&path) {
        Err(BandError::Schema { missing, .. }) => assert_eq!(missing, vec!["AF7", "TP10"]),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[test]
fn test_theta_dominates_for_5hz_sine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("theta.csv");
    write_sine_recording(&path, 5.0, 10.0, FS).unwrap();

    let mut pipeline = Pipeline::new(AnalysisConfig::time_course()).unwrap();
    let recording = pipeline.load(&path).unwrap();
    assert_eq!(recording.n_channels(), 4);

    let psd = pipeline.signal_psd(&recording).unwrap();
    let relative = pipeline.aggregator().aggregate(&psd, Granularity::Whole, true);
    println!("relative band power: {:?}", relative.row(0));

    assert!(relative[[0, 0]] > 0.5);
    assert!(relative[[0, 3]] < 0.01);
    assert!((relative.row(0).sum() - 1.0).abs() < 1e-9);

    // 每个 epoch 的相对功率同样以 Theta 为主
    let epoch_psd = pipeline.epoch_psd(&recording).unwrap();
    let per_epoch = pipeline
        .aggregator()
        .aggregate(&epoch_psd, Granularity::PerEpoch, true);
    assert_eq!(per_epoch.nrows(), 10);
    assert!(per_epoch.column(0).iter().all(|&v| v > 0.5));
}

#[test]
fn test_time_course_aligns_to_shortest_session() {
    let dir = tempfile::tempdir().unwrap();
    write_sine_recording(&dir.path().join("a_long.csv"), 5.0, 20.0, FS).unwrap();
    write_sine_recording(&dir.path().join("b_short.csv"), 6.0, 15.0, FS).unwrap();

    let report = run_time_course(AnalysisConfig::time_course(), dir.path()).unwrap();

    assert_eq!(report.sessions[0].len(), 20);
    assert_eq!(report.sessions[1].len(), 15);
    assert_eq!(report.aligned.len(), 15);
    assert_eq!(report.aligned.discarded, vec![5, 0]);
    assert_eq!(report.aligned.labels, vec!["a_long", "b_short"]);
    assert!(report.aligned.sem.iter().all(|v| v.is_finite()));

    let table = dir.path().join("course.csv");
    report.aligned.write_csv(fs::File::create(&table).unwrap()).unwrap();
    let text = fs::read_to_string(&table).unwrap();
    assert_eq!(text.lines().count(), 16);
    assert!(text.starts_with("epoch,mean,std,sem"));

    let svg = dir.path().join("course.svg");
    plot::render_time_course(&report.aligned, &report.band, &svg).unwrap();
    assert!(fs::read_to_string(&svg).unwrap().contains("<svg"));
}

#[test]
fn test_correlation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("Brain Wave Files");
    fs::create_dir(&data).unwrap();

    // Theta 比例逐个 trial 增大，Alpha 比例逐个减小
    for k in 1..=4 {
        let theta = 10.0 * k as f64;
        let alpha = 50.0 - 10.0 * k as f64;
        write_mixture(&data.join(format!("trial_{}.csv", k)), theta, alpha, 8.0);
    }
    let scores = dir.path().join("scores.csv");
    fs::write(&scores, "Trial,Focus,Effort\n1,2,5\n2,4,5\n3,6,5\n4,8,5\n5,10,5\n").unwrap();

    let report = run_correlation(AnalysisConfig::correlation(), &data, &scores).unwrap();
    let result = &report.result;

    assert_eq!(result.matched_trials, vec![1, 2, 3, 4]);
    assert!(result.unmatched_band_trials.is_empty());
    assert_eq!(result.unmatched_score_trials, vec![5]);
    assert!((result.get("Theta", "Focus").unwrap() - 1.0).abs() < 1e-12);
    assert!((result.get("Alpha", "Focus").unwrap() + 1.0).abs() < 1e-12);
    assert!(result.get("Theta", "Effort").unwrap().is_nan());

    for trial in &report.trials {
        let total: f64 = trial.powers.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    let svg = dir.path().join("heatmap.svg");
    plot::render_correlation_heatmap(result, &svg).unwrap();
    let content = fs::read_to_string(&svg).unwrap();
    assert!(content.contains("1.00"));
    assert!(content.contains("NaN"));
}

#[test]
fn test_correlation_without_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    write_sine_recording(&data.join("one.csv"), 5.0, 4.0, FS).unwrap();
    let scores = dir.path().join("scores.csv");
    fs::write(&scores, "Trial,Focus\n9,1\n10,2\n").unwrap();

    assert!(matches!(
        run_correlation(AnalysisConfig::correlation(), &data, &scores),
        Err(BandError::JoinMismatch { .. })
    ));
}

#[test]
fn test_topomap_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rawBrainwaves.csv");
    let amplitudes = [40.0, 20.0, 10.0, 5.0];
    write_recording(&path, FS, 6.0, |ch, t| 800.0 + amplitudes[ch] * (2.0 * PI * 6.0 * t).sin()).unwrap();

    let report = run_topomap(AnalysisConfig::topomap(), &path).unwrap();
    let values: Vec<f64> = report.field.sensors.iter().map(|s| s.value).collect();
    println!("theta per channel: {:?}", values);

    // TP9, AF7, AF8, TP10 的功率按振幅平方递减
    assert!(values.windows(2).all(|w| w[0] > w[1]));
    assert!((values[0] / values[1] - 4.0).abs() < 0.2);
    assert_eq!(report.field.grid.dim(), (64, 64));
    assert!(report.field.grid[[32, 32]].is_finite());
    assert!(report.field.grid[[0, 0]].is_nan());

    let svg = dir.path().join("topomap.svg");
    plot::render_topomap(&report.field, "Theta", &svg).unwrap();
    let content = fs::read_to_string(&svg).unwrap();
    for name in ["TP9", "AF7", "AF8", "TP10"] {
        assert!(content.contains(name));
    }
}

#[test]
fn test_topomap_rejects_channels_outside_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aux.csv");
    let mut text = String::from("TP9,AUX\n");
    for i in 0..512 {
        let t = i as f64 / FS;
        text.push_str(&format!("{},{}\n", 800.0 + (2.0 * PI * 6.0 * t).sin(), 700.0 + t));
    }
    fs::write(&path, text).unwrap();

    let mut config = AnalysisConfig::topomap();
    config.channels = vec!["TP9".to_string(), "AUX".to_string()];
    match run_topomap(config, &path) {
        Err(BandError::UnknownChannel(name)) => assert_eq!(name, "AUX"),
        other => panic!("expected unknown channel, got {:?}", other.map(|r| r.label)),
    }
}

#[test]
fn test_config_file_overrides_preset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.toml");
    fs::write(
        &path,
        "rescale_divisor = 1000.0\nepoch_duration = 2.0\n\n[spectral]\nn_fft = 512\n",
    )
    .unwrap();

    let config = AnalysisConfig::time_course().merge_toml_file(&path).unwrap();
    assert_eq!(config.rescale_divisor, 1000.0);
    assert_eq!(config.epoch_samples(), 512);
    assert_eq!(config.filter.low_hz, 1.0);

    write_sine_recording(&dir.path().join("s.csv"), 5.0, 10.0, FS).unwrap();
    let report = run_time_course(config, dir.path()).unwrap();
    assert_eq!(report.aligned.len(), 5);
}
