use clap::{Args, Subcommand};

use super::bike::find_bike;
use super::{confirm, now_millis, parse_date, App, OutputFormat};
use bikelog::models::Maintenance;

#[derive(Args)]
pub struct MaintenanceCommand {
    #[command(subcommand)]
    pub command: MaintenanceSubcommand,
}

#[derive(Subcommand)]
pub enum MaintenanceSubcommand {
    /// Add a maintenance item to a bike
    Add {
        /// Bike ID or name
        bike: String,

        /// What was (or needs to be) done
        name: String,

        /// Mark as done at this odometer / hour-meter value
        #[arg(long)]
        done_at: Option<f64>,

        /// Completion date (YYYY-MM-DD, default: today); requires --done-at
        #[arg(long, requires = "done_at")]
        date: Option<String>,
    },

    /// List a bike's maintenances
    List {
        /// Bike ID or name
        bike: String,

        /// Only show pending items
        #[arg(long)]
        pending: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Mark a pending maintenance as done
    Done {
        /// Maintenance ID
        id: i64,

        /// Odometer / hour-meter value at completion
        #[arg(long)]
        value: f64,

        /// Completion date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete a maintenance item
    Delete {
        /// Maintenance ID
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn completion_date(date: &Option<String>) -> Result<i64, String> {
    match date {
        Some(value) => parse_date(value),
        None => Ok(now_millis()),
    }
}

impl MaintenanceCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            MaintenanceSubcommand::Add {
                bike,
                name,
                done_at,
                date,
            } => {
                let bike = find_bike(app, bike).await?;

                let maintenance = match done_at {
                    Some(value) => {
                        Maintenance::done(bike.id, name.as_str(), *value, completion_date(date)?)
                    }
                    None => Maintenance::todo(bike.id, name.as_str()),
                };

                let created = app.maintenances.create(&maintenance).await?;
                println!("Added to '{}':", bike.name);
                println!("  {}", created);
                Ok(())
            }

            MaintenanceSubcommand::List {
                bike,
                pending,
                format,
            } => {
                app.try_auto_sync().await;
                let bike = find_bike(app, bike).await?;

                let maintenances: Vec<_> = app
                    .maintenances
                    .all(bike.id)
                    .await?
                    .into_iter()
                    .filter(|m| !*pending || !m.is_done)
                    .collect();

                if maintenances.is_empty() {
                    println!("No maintenances found for '{}'", bike.name);
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&maintenances)?);
                    }
                    OutputFormat::Text => {
                        let unit = bike.counting_method.unit();
                        println!(
                            "{:<6}  {:<30}  {:>12}  {:<10}  SYNCED",
                            "ID", "NAME", "VALUE", "DATE"
                        );
                        println!("{}", "-".repeat(76));
                        for m in &maintenances {
                            let (value, date) = match m.completed_at() {
                                Some(at) => (
                                    format!("{} {}", m.value, unit),
                                    at.format("%Y-%m-%d").to_string(),
                                ),
                                None => ("-".to_string(), "pending".to_string()),
                            };
                            println!(
                                "{:<6}  {:<30}  {:>12}  {:<10}  {}",
                                m.id,
                                m.name,
                                value,
                                date,
                                if m.remote_ref.is_some() { "yes" } else { "no" }
                            );
                        }
                        println!("\nTotal: {} maintenance(s)", maintenances.len());
                    }
                }
                Ok(())
            }

            MaintenanceSubcommand::Done { id, value, date } => {
                let existing = match app.maintenances.get(*id).await? {
                    Some(m) => m,
                    None => return Err(format!("Maintenance not found: {}", id).into()),
                };
                if existing.is_done {
                    tracing::info!("Maintenance {} was already done, overwriting", id);
                }

                let done = app
                    .maintenances
                    .mark_done(*id, *value, completion_date(date)?)
                    .await?;
                println!("Marked as done:");
                println!("  {}", done);
                Ok(())
            }

            MaintenanceSubcommand::Delete { id, force } => {
                let maintenance = match app.maintenances.get(*id).await? {
                    Some(m) => m,
                    None => return Err(format!("Maintenance not found: {}", id).into()),
                };

                if !force && !confirm(&format!("Delete maintenance '{}'?", maintenance.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                app.maintenances.delete(*id).await?;
                println!("Deleted maintenance: {}", maintenance.name);
                Ok(())
            }
        }
    }
}
