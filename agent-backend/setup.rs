//! Sample profile wizard: writes an editable profile and prints how to use it.
//!
//! Usage:
//!   activity-agent sample-config                 # writes sample.json
//!   activity-agent sample-config --name alice    # writes alice.json

use anyhow::Result;

use crate::profiles::AgentConfig;
use crate::profiles::repository::ProfileRepository;

pub const DEFAULT_SAMPLE_NAME: &str = "sample";

/// Write the sample profile and print next steps.
pub async fn run(repo: &dyn ProfileRepository, name: Option<String>) -> Result<()> {
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SAMPLE_NAME.to_string());

    let path = repo.save_sample(&name).await?;
    let sample = AgentConfig::from_value(AgentConfig::sample_value())?;

    println!();
    println!("===================================================");
    println!("  Activity Agent Sample Profile");
    println!("===================================================");
    println!();
    println!("  Saved to: {}", path.display());
    println!();
    println!("  User:         {} ({})", sample.full_name, sample.username);
    println!(
        "  Work hours:   {}-{}",
        sample.work_schedule.start_time.format("%H:%M"),
        sample.work_schedule.end_time.format("%H:%M")
    );
    for b in &sample.work_schedule.breaks {
        println!("  Break:        {} for {} min", b.start.format("%H:%M"), b.duration_minutes);
    }
    println!("  Applications: {}", sample.applications_used.join(", "));
    println!();
    println!("===================================================");
    println!("  Next Steps");
    println!("===================================================");
    println!();
    println!("  STEP 1: Edit the profile");
    println!("    Set username, work_schedule and applications_used.");
    println!("    Applications outside the built-in list need a");
    println!("    custom_commands entry (see \"Terminal\" in the sample).");
    println!();
    println!("  STEP 2: Check the schedule");
    println!("    activity-agent check --config {name}");
    println!();
    println!("  STEP 3: Rehearse without touching the desktop");
    println!("    activity-agent run --config {name} --dry-run");
    println!();
    println!("  STEP 4: Run for real");
    println!("    activity-agent run --config {name}");
    println!();

    Ok(())
}
