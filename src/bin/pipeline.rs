use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cipher_pipeline::context::SessionContext;
use cipher_pipeline::engine::mock::MockFheEngine;
use cipher_pipeline::registry::memory::InMemoryRegistry;
use cipher_pipeline::registry::ops::RegistryCall;
use cipher_pipeline::submit::Submitter;
use cipher_pipeline::types::{Address, Category, DatasetForm, DatasetId, SessionId};
use cipher_pipeline::workflow::{WorkflowController, WorkflowState};
use clap::Parser;
use rand::RngCore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
struct Args {
    #[arg(long, default_value = "demo-genomes")]
    name: String,

    #[arg(long, default_value = "Synthetic genome panel for the demo run")]
    description: String,

    #[arg(long, default_value = "medical")]
    category: String,

    #[arg(long, default_value_t = 95)]
    quality: u32,

    /// Size of the synthetic data file, in bytes.
    #[arg(long, default_value_t = 4096)]
    file_size: usize,

    /// Per-engine-call latency so staged progress is visible.
    #[arg(long, default_value_t = 200)]
    stage_latency_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let category = Category::parse(&args.category)
        .with_context(|| format!("unknown category '{}'", args.category))?;

    let mut addr = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut addr);
    let address = Address(addr);

    let engine =
        Arc::new(MockFheEngine::new().with_latency(Duration::from_millis(args.stage_latency_ms)));
    let transport = Arc::new(InMemoryRegistry::new(address));
    let ctx = SessionContext::new(address, engine, transport);
    let wf = WorkflowController::new(ctx.clone());

    let mut file = vec![0u8; args.file_size];
    rand::thread_rng().fill_bytes(&mut file);
    let form = DatasetForm {
        name: args.name.clone(),
        description: args.description,
        category: Some(category),
        quality_score: args.quality,
        file,
    };

    // Create the dataset: collect input, encrypt with visible progress,
    // then hand the payload to the submission layer.
    wf.begin()?;
    wf.set_input(&form)?;

    let progress_wf = wf.clone();
    let reporter = tokio::spawn(async move {
        let mut reported = 0;
        loop {
            if let Some(p) = progress_wf.last_progress() {
                if p.completed_stages > reported {
                    reported = p.completed_stages;
                    info!(
                        stage = %p.current_stage,
                        fraction = format!("{:.2}", p.fraction_complete()),
                        "encryption progress"
                    );
                }
                if p.fraction_complete() >= 1.0 {
                    break;
                }
            }
            if matches!(progress_wf.state(), WorkflowState::Error { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    wf.encrypt().await?;
    let _ = reporter.await;

    let tx = wf.submit_with_timeout(Some(Duration::from_secs(30))).await?;
    info!(tx = %tx.0, "dataset created");

    let dataset_id = DatasetId(0);
    let info = wf.reader().get_dataset_info(dataset_id).await?;
    info!(name = %info.name, category = info.category.as_str(), "read back dataset");

    // Contribute to the dataset we just created; a contribution needs its
    // own payload and proof.
    wf.reset();
    wf.begin()?;
    wf.set_contribution_input(&form, dataset_id, "additional demo rows")?;
    wf.encrypt().await?;
    let tx = wf.submit().await?;
    info!(tx = %tx.0, "contribution submitted");

    wf.reader()
        .invalidate(&cipher_pipeline::registry::ReadQuery::GetDatasetInfo(dataset_id));
    let info = wf.reader().get_dataset_info(dataset_id).await?;
    let reputation = wf.reader().get_contributor_reputation(address).await?;
    info!(
        contributions = info.contribution_count,
        reputation, "registry state after contribution"
    );

    // Training-session operations go through the same generic invoker.
    let submitter = Submitter::new(ctx.transport);
    let config = serde_json::json!({ "epochs": 3, "batch_size": 64 }).to_string();
    let tx = submitter
        .invoke(RegistryCall::start_training_session(dataset_id, &config))
        .await?;
    info!(tx = %tx.0, "training session started");

    let engine = MockFheEngine::new();
    let payload = {
        use cipher_pipeline::engine::EncryptionEngine;
        let loss = engine.encrypt(17).await?;
        let accuracy = engine.encrypt(93).await?;
        let proof = engine.prove_correctness(&[loss.clone(), accuracy.clone()]).await?;
        cipher_pipeline::types::EncryptedPayload {
            encrypted_size: loss,
            encrypted_quality: accuracy,
            proof,
        }
    };
    let tx = submitter
        .invoke(RegistryCall::complete_training_session(SessionId(0), &payload))
        .await?;
    info!(tx = %tx.0, "training session completed");

    Ok(())
}
