//! # Mailprobe Web - Dry Run Example
//!
//! Runs the full inbox verification against an in-memory page, once with a
//! fragment the message contains and once with one it does not.
//!
//! Run with: `cargo run --example dry-run`

use mailprobe_web::{FlowConfig, InboxFlow, MockSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("mailprobe-dry-run");
    tokio::fs::create_dir_all(&dir).await?;

    for fragment in ["This is a test message", "nonexistent-text-xyz"] {
        let config = FlowConfig::builder()
            .expected_fragment(fragment)
            .timeout_ms(2_000)
            .evidence_path(dir.join("email-screenshot.png"))
            .build();
        config.validate()?;

        let session = MockSession::inbox_builder(
            &config.selectors,
            "Hello, This is a test message sent by the dry run.",
        )
        .build();

        let report = InboxFlow::new(&session, &config).run().await;

        println!("Looking for '{}'", fragment);
        for record in &report.states {
            println!("   {:<20} {:>5}ms", record.state, record.elapsed_ms);
        }
        println!("   outcome: {:?}", report.outcome);
        if let Some(failure) = report.failure {
            println!("   failed at {}: {}", failure.state, failure.message);
        }
        println!();
    }

    Ok(())
}
