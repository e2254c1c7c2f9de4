// ██╗███╗   ███╗██████╗  █████╗  ██████╗████████╗
// ██║████╗ ████║██╔══██╗██╔══██╗██╔════╝╚══██╔══╝
// ██║██╔████╔██║██████╔╝███████║██║        ██║
// ██║██║╚██╔╝██║██╔═══╝ ██╔══██║██║        ██║
// ██║██║ ╚═╝ ██║██║     ██║  ██║╚██████╗   ██║
// ╚═╝╚═╝     ╚═╝╚═╝     ╚═╝  ╚═╝ ╚═════╝   ╚═╝
//
// D E T E C T O R
//
// Train an outlier ensemble on a pile of job postings, then tell you which
// of your new postings are impact jobs. YAKE + TF-IDF + KNN + a hand-rolled
// one-class SVM, all to decide whether a job description cares about the
// planet.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use impact_detector::{Config, FileArtifactStore, ImpactDetectorModel, JsonRecordSource, TrainOutcome};

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║        ⚡ IMPACT JOB DETECTOR ⚡                                 ║
    ║                                                                  ║
    ║   Keywords:  YAKE, top 50, up to trigrams                        ║
    ║   Features:  TF-IDF, fit once, frozen forever                    ║
    ║   Ensemble:  8-NN distance geometry + one-class SVM              ║
    ║   Fallback:  fuzzy match against 37 impact phrases               ║
    ║                                                                  ║
    ║   "Inliers are the ones doing good."                             ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

fn main() -> Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    print_banner();

    // Load configuration
    let config = Config::from_env();
    info!(
        "✅ Configuration loaded: name={}, records={}, artifacts={}",
        config.model_name,
        config.records_path.display(),
        config.artifact_dir.display()
    );

    let source = JsonRecordSource::new(config.records_path.clone());
    let store = FileArtifactStore::from_config(&config);
    let query_path = config.query_path.clone();
    let force = config.force_retrain;
    let detector = ImpactDetectorModel::new(config, source, store);

    match detector.train(force).context("training failed")? {
        TrainOutcome::Trained(report) => {
            info!(
                "🟢 {} trained: run={} records={} ({} train / {} test) accuracy={:.3} threshold={:.4} cached={}",
                detector.name(),
                report.run_id,
                report.total_records,
                report.train_records,
                report.test_records,
                report.accuracy,
                report.threshold,
                report.from_cache,
            );
        }
        TrainOutcome::AlreadyTraining => warn!("Training already in progress"),
    }

    if let Some(path) = query_path {
        let queries = JsonRecordSource::new(path.clone())
            .load_unvalidated()
            .with_context(|| format!("failed to read queries from {}", path.display()))?;
        info!("🔎 Classifying {} queries", queries.len());

        let verdicts = detector.predict(&queries).context("prediction failed")?;
        for (record, impact) in queries.iter().zip(verdicts) {
            println!("{}", json!({ "id": record.id, "impact": impact }));
        }
    }

    let snapshot = detector.metrics().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    info!("💀 IMPACT DETECTOR: DONE");
    Ok(())
}
