//! `stats` command implementation.

use anyhow::Result;
use contracts::ClinicianId;
use jobs::DoctorStatistics;

use crate::cli::StatsArgs;
use crate::context::{record_dir, record_service};

/// Execute the `stats` command
pub async fn run_stats(args: &StatsArgs) -> Result<()> {
    let dir = record_dir(&args.config, args.store_dir.as_deref())?;
    let service = record_service(&dir);

    let clinician = ClinicianId::from(args.clinician.as_str());
    let stats = service.get_statistics(&clinician).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_statistics(&stats);
    }
    Ok(())
}

fn print_statistics(stats: &DoctorStatistics) {
    println!("Clinician {} - {} job(s)", stats.clinician_id, stats.total_jobs);
    for (status, count) in &stats.counts_by_status {
        println!("  {:<10} {}", status.as_str(), count);
    }

    if !stats.per_class.is_empty() {
        println!("\nMean volume per class (over jobs where present):");
        for (class, class_stats) in &stats.per_class {
            println!(
                "  {:<18} {:>9.3} cm3  (min {:.3}, max {:.3}, n={})",
                class.display_name(),
                class_stats.mean_cm3,
                class_stats.min_cm3,
                class_stats.max_cm3,
                class_stats.jobs
            );
        }
    }
    if let Some(mean) = stats.mean_total_volume_cm3 {
        println!("  {:<18} {:>9.3} cm3", "total", mean);
    }

    if !stats.excluded.is_empty() {
        println!("\nExcluded pending reconciliation:");
        for excluded in &stats.excluded {
            match excluded.job_id {
                Some(id) => println!("  {}  {}", id, excluded.reason),
                None => println!("  (unnamed)  {}", excluded.reason),
            }
        }
    }
}
