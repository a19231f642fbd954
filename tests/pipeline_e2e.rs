mod common;

use anyhow::anyhow;
use common::{FakeAuditor, image_dir, read_jsonl};
use edit_audit::{
    config::Config,
    dataset::{DatasetOptions, PairDataset},
    paths,
    pipeline::Pipeline,
    workers::{results_path, run_pool, run_worker},
};

fn edited_names(rows: &[serde_json::Value]) -> Vec<String> {
    rows.iter()
        .map(|r| {
            std::path::Path::new(r["edit_path"].as_str().unwrap())
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[test]
fn three_pairs_emit_three_results_in_sort_order() {
    let root = tempfile::tempdir().unwrap();
    let files = ["0001.png", "0002.png", "0003.png"];
    let o = image_dir(root.path(), "input", &files);
    let e = image_dir(root.path(), "output", &files);
    let run_dir = root.path().join("run");
    std::fs::create_dir(&run_dir).unwrap();

    let cfg = Config::default();
    let ds = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();
    let report = run_worker(&cfg, &ds, None, &run_dir, |_| Ok(FakeAuditor::default()));

    assert_eq!(report.processed, 3);
    assert_eq!(report.passed, 3);
    assert!(report.init_error.is_none());

    let rows = read_jsonl(&run_dir.join("results.jsonl"));
    assert_eq!(rows.len(), 3);
    for (row, name) in rows.iter().zip(files) {
        assert_eq!(row["img_path"], paths::display_key(&paths::resolve(o.join(name))));
        assert_eq!(row["edit_path"], paths::display_key(&paths::resolve(e.join(name))));
        assert_eq!(row["is_success"], true);
        assert_eq!(row["comment"], "Yes. Clean edit.");
        assert_eq!(row["refine_prompt"], "");
        assert!(row.get("raw_response").is_none());
    }
}

#[test]
fn resume_log_skips_already_processed_pair() {
    let root = tempfile::tempdir().unwrap();
    let files = ["a.png", "b.png", "c.png"];
    let o = image_dir(root.path(), "input", &files);
    let e = image_dir(root.path(), "output", &files);
    let run_dir = root.path().join("run");
    std::fs::create_dir(&run_dir).unwrap();

    let cfg = Config::default();
    let first = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();
    let log = root.path().join("prior.jsonl");
    let prior = serde_json::json!({
        "score": 1.0,
        "is_success": true,
        "comment": "",
        "refine_prompt": "",
        "img_path": paths::display_key(&first.pairs()[1].original),
        "edit_path": paths::display_key(&first.pairs()[1].edited),
    });
    std::fs::write(&log, format!("{prior}\n")).unwrap();

    let opts = DatasetOptions {
        resume_logs: vec![log],
        ..Default::default()
    };
    let ds = PairDataset::build(&o, &e, &opts).unwrap();
    let report = run_worker(&cfg, &ds, None, &run_dir, |_| Ok(FakeAuditor::default()));

    assert_eq!(report.processed, 2);
    let rows = read_jsonl(&run_dir.join("results.jsonl"));
    assert_eq!(edited_names(&rows), ["a.png", "c.png"]);
}

#[test]
fn results_feed_the_next_runs_resume() {
    let root = tempfile::tempdir().unwrap();
    let files = ["a.png", "b.png"];
    let o = image_dir(root.path(), "input", &files);
    let e = image_dir(root.path(), "output", &files);
    let run_dir = root.path().join("run");
    std::fs::create_dir(&run_dir).unwrap();
    let cfg = Config::default();

    let ds = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();
    run_worker(&cfg, &ds, None, &run_dir, |_| Ok(FakeAuditor::default()));

    let opts = DatasetOptions {
        resume_logs: vec![run_dir.join("results.jsonl")],
        ..Default::default()
    };
    let again = PairDataset::build(&o, &e, &opts).unwrap();
    assert!(again.is_empty());
}

#[test]
fn two_workers_split_by_stride() {
    let root = tempfile::tempdir().unwrap();
    let files = ["0.png", "1.png", "2.png", "3.png"];
    let o = image_dir(root.path(), "input", &files);
    let e = image_dir(root.path(), "output", &files);
    let run_dir = root.path().join("run");
    std::fs::create_dir(&run_dir).unwrap();

    let cfg = Config::default();
    let ds = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();
    let reports = run_pool(&cfg, &ds, 2, &run_dir, |_| Ok(FakeAuditor::default())).unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].rank, 0);
    assert_eq!(reports[0].processed, 2);
    assert_eq!(reports[1].processed, 2);

    let shard0 = read_jsonl(&results_path(&run_dir, "results.jsonl", Some(edit_audit::Shard::new(0, 2).unwrap())));
    let shard1 = read_jsonl(&results_path(&run_dir, "results.jsonl", Some(edit_audit::Shard::new(1, 2).unwrap())));
    assert_eq!(edited_names(&shard0), ["0.png", "2.png"]);
    assert_eq!(edited_names(&shard1), ["1.png", "3.png"]);
}

#[test]
fn failed_worker_init_leaves_its_shard_unprocessed() {
    let root = tempfile::tempdir().unwrap();
    let files = ["0.png", "1.png", "2.png", "3.png"];
    let o = image_dir(root.path(), "input", &files);
    let e = image_dir(root.path(), "output", &files);
    let run_dir = root.path().join("run");
    std::fs::create_dir(&run_dir).unwrap();

    let cfg = Config::default();
    let ds = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();
    let reports = run_pool(&cfg, &ds, 2, &run_dir, |rank| {
        if rank == 1 {
            Err(anyhow!("no GPU for rank {rank}"))
        } else {
            Ok(FakeAuditor::default())
        }
    })
    .unwrap();

    assert_eq!(reports[0].processed, 2);
    assert!(reports[0].init_error.is_none());
    assert_eq!(reports[1].processed, 0);
    assert_eq!(reports[1].assigned, 2);
    assert!(reports[1].init_error.as_deref().unwrap().contains("no GPU"));
    assert!(!results_path(&run_dir, "results.jsonl", Some(edit_audit::Shard::new(1, 2).unwrap())).exists());
}

#[test]
fn engine_errors_are_skipped_unless_stop_on_error() {
    let root = tempfile::tempdir().unwrap();
    let o = image_dir(root.path(), "input", &["1.png", "2.png", "3.png"]);
    let e = image_dir(root.path(), "output", &["1.png", "2_explode.png", "3_reject.png"]);
    let ds = PairDataset::build(&o, &e, &DatasetOptions::default()).unwrap();

    let run_dir = root.path().join("lenient");
    std::fs::create_dir(&run_dir).unwrap();
    let cfg = Config::default();
    let report = run_worker(&cfg, &ds, None, &run_dir, |_| Ok(FakeAuditor::default()));
    assert_eq!(report.processed, 2);
    assert_eq!(report.passed, 1);
    assert_eq!(report.errored, 1);
    assert!(report.errors[0].edit_path.ends_with("2_explode.png"));
    assert!(report.aborted.is_none());

    let rows = read_jsonl(&run_dir.join("results.jsonl"));
    assert_eq!(rows[1]["is_success"], false);
    assert_eq!(rows[1]["comment"], "No. The background shifted.");
    assert_eq!(rows[1]["refine_prompt"], "Keep the background untouched.");

    let strict_dir = root.path().join("strict");
    std::fs::create_dir(&strict_dir).unwrap();
    let mut strict = Config::default();
    strict.run.stop_on_error = true;
    let report = run_worker(&strict, &ds, None, &strict_dir, |_| Ok(FakeAuditor::default()));
    assert_eq!(report.processed, 1);
    assert!(report.aborted.is_some());
}

#[test]
fn audit_pair_scores_from_candidate_logits() {
    let root = tempfile::tempdir().unwrap();
    let o = image_dir(root.path(), "input", &["x.png"]);
    let e = image_dir(root.path(), "output", &["x_reject.png"]);
    let pipeline = Pipeline::new(&Config::default(), FakeAuditor::default());

    let res = pipeline
        .audit_pair(&o.join("x.png"), &e.join("x_reject.png"), "Has this picture edited properly?")
        .unwrap();
    // (1 - 5) / 5
    assert!((res.score() + 0.8).abs() < 1e-12);
    assert!(!res.is_success());
    assert_eq!(pipeline.engine().calls.lock().unwrap().len(), 1);
}
