use clap::{Args, Subcommand};

use super::{confirm, App, OutputFormat};
use bikelog::models::{Bike, CountingMethod};

#[derive(Args)]
pub struct BikeCommand {
    #[command(subcommand)]
    pub command: BikeSubcommand,
}

#[derive(Subcommand)]
pub enum BikeSubcommand {
    /// Add a new bike
    Add {
        /// Name of the bike
        name: String,

        /// How maintenance values are counted (distance or hours)
        #[arg(long, short = 'm', default_value = "distance")]
        counting: CountingMethod,
    },

    /// List all bikes
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a bike and its maintenances
    Show {
        /// Bike ID or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing bike
    Update {
        /// Bike ID or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New counting method
        #[arg(long, short = 'm')]
        counting: Option<CountingMethod>,
    },

    /// Delete a bike and all its maintenances
    Delete {
        /// Bike ID or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Looks a bike up by ID or name.
pub(super) async fn find_bike(app: &App, identifier: &str) -> Result<Bike, Box<dyn std::error::Error>> {
    match app.bikes.find(identifier).await? {
        Some(bike) => Ok(bike),
        None => Err(format!("Bike not found: {}", identifier).into()),
    }
}

impl BikeCommand {
    pub async fn run(&self, app: &App) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BikeSubcommand::Add { name, counting } => {
                let created = app.bikes.create(name, *counting).await?;
                println!("Created bike:");
                println!("{}", created);
                Ok(())
            }

            BikeSubcommand::List { format } => {
                app.try_auto_sync().await;
                let bikes = app.bikes.all().await?;

                if bikes.is_empty() {
                    println!("No bikes found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&bikes)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<6}  {:<30}  {:<10}  SYNCED", "ID", "NAME", "COUNTING");
                        println!("{}", "-".repeat(60));
                        for bike in &bikes {
                            let name = if bike.name.chars().count() > 30 {
                                format!("{}...", bike.name.chars().take(27).collect::<String>())
                            } else {
                                bike.name.clone()
                            };
                            println!(
                                "{:<6}  {:<30}  {:<10}  {}",
                                bike.id,
                                name,
                                bike.counting_method.to_string(),
                                if bike.is_synced() { "yes" } else { "no" }
                            );
                        }
                        println!("\nTotal: {} bike(s)", bikes.len());
                    }
                }
                Ok(())
            }

            BikeSubcommand::Show { identifier, format } => {
                app.try_auto_sync().await;
                let bike = find_bike(app, identifier).await?;
                let maintenances = app.maintenances.all(bike.id).await?;

                match format {
                    OutputFormat::Json => {
                        let json = serde_json::json!({
                            "bike": bike,
                            "maintenances": maintenances,
                        });
                        println!("{}", serde_json::to_string_pretty(&json)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", bike);
                        println!();
                        if maintenances.is_empty() {
                            println!("No maintenances");
                        } else {
                            println!("Maintenances:");
                            for maintenance in &maintenances {
                                println!("  {}", maintenance);
                            }
                        }
                    }
                }
                Ok(())
            }

            BikeSubcommand::Update {
                identifier,
                name,
                counting,
            } => {
                if name.is_none() && counting.is_none() {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let mut bike = find_bike(app, identifier).await?;
                if let Some(new_name) = name {
                    bike.name = new_name.clone();
                }
                if let Some(new_counting) = counting {
                    bike.counting_method = *new_counting;
                }

                let updated = app.bikes.update(&bike).await?;
                println!("Updated bike:");
                println!("{}", updated);
                Ok(())
            }

            BikeSubcommand::Delete { identifier, force } => {
                let bike = find_bike(app, identifier).await?;

                if !force && !confirm(&format!("Delete bike '{}' and its maintenances?", bike.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                app.bikes.delete(bike.id).await?;
                println!("Deleted bike: {}", bike.name);
                Ok(())
            }
        }
    }
}
