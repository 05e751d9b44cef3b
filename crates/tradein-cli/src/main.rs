// ============================================================================
// tradein - command line front end for the trade-in swap engine
// ============================================================================
// Usage:
//   tradein estimate --storage 256GB --ram 8GB --condition Good   Value one device
//   tradein catalog                                              List target devices
//   tradein draft show | clear | import <FILE>                   Manage the pending draft
//   tradein submit                                               Submit the pending draft
//   tradein swaps                                                List your swap requests
// ============================================================================

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tradein_core::pricing::amount_owed;
use tradein_core::valuation::breakdown;
use tradein_core::{
    parse_battery_health, Catalog, Contact, DataUrlEncoder, DevicePatch, DeviceRecord, DraftStore,
    EnvTokenProvider, HttpSwapClient, ListingState, RawImage, RedbDraftStore,
    SubmissionCoordinator, SwapConfig, SwapListing, Wizard, WizardSession, ISSUES,
};

/// Trade in your devices towards a new one
#[derive(Parser)]
#[command(name = "tradein", version, about = "Value devices and submit trade-in swap requests")]
struct Cli {
    /// Path to the draft database (default: ~/.tradein/drafts.redb)
    #[arg(long, global = true)]
    draft_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the trade-in value of a single device
    Estimate {
        #[arg(long)]
        storage: String,

        #[arg(long)]
        ram: String,

        #[arg(long)]
        condition: String,

        /// Declared issue (repeatable): "Screen crack", Camera, Speaker, "Charging port"
        #[arg(long = "issue")]
        issues: Vec<String>,

        /// Battery health percentage (0-100)
        #[arg(long)]
        battery: Option<String>,

        /// Price of the device you want, to compute the amount owed
        #[arg(long)]
        target_price: Option<f64>,
    },

    /// List the devices you can swap towards
    Catalog,

    /// Inspect or build the pending draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Submit the pending draft as a swap request
    Submit,

    /// List your swap requests and their status
    Swaps,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Show the pending draft and what it still needs
    Show,

    /// Discard the pending draft
    Clear,

    /// Build a draft from a JSON form file
    Import { file: PathBuf },
}

/// JSON form accepted by `draft import`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftForm {
    devices: Vec<DeviceForm>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    target_device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DeviceForm {
    category: String,
    brand: String,
    model: String,
    storage: String,
    ram: String,
    condition: String,
    issues: Vec<String>,
    battery_health: String,
    /// Photo files to attach
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tradein=info".parse()?)
                .add_directive("tradein_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = SwapConfig::from_env();
    if cli.draft_path.is_some() {
        config.draft_path = cli.draft_path;
    }

    match cli.command {
        Commands::Estimate {
            storage,
            ram,
            condition,
            issues,
            battery,
            target_price,
        } => cmd_estimate(storage, ram, condition, issues, battery, target_price),
        Commands::Catalog => cmd_catalog(&config).await,
        Commands::Draft { action } => {
            let drafts = RedbDraftStore::from_config(&config)?;
            match action {
                DraftAction::Show => cmd_draft_show(&drafts),
                DraftAction::Clear => {
                    drafts.clear()?;
                    println!("Draft cleared.");
                    Ok(())
                }
                DraftAction::Import { file } => cmd_draft_import(&config, &drafts, &file).await,
            }
        }
        Commands::Submit => cmd_submit(&config).await,
        Commands::Swaps => cmd_swaps(&config).await,
    }
}

fn cmd_estimate(
    storage: String,
    ram: String,
    condition: String,
    issues: Vec<String>,
    battery: Option<String>,
    target_price: Option<f64>,
) -> Result<()> {
    let mut device = DeviceRecord::blank();
    device.storage = storage;
    device.ram = ram;
    device.condition = condition;
    device.issues = issues;
    device.battery_health = parse_battery_health(battery.as_deref().unwrap_or(""))?;

    for (field, value) in device.off_vocabulary() {
        warn!("'{}' is not a known {}, it lowers the estimate", value, field);
    }

    let b = breakdown(&device);
    println!("=== Trade-In Estimate ===");
    println!("Base:              {:>8.2}", b.base);
    println!("Storage boost:     {:>8.2}", b.storage_boost);
    println!("RAM boost:         {:>8.2}", b.ram_boost);
    println!("Condition penalty: {:>8.2}", -b.condition_penalty);
    println!("Issues penalty:    {:>8.2}", -b.issues_penalty);
    println!("Battery penalty:   {:>8.2}", -b.battery_penalty);
    println!("{}", "-".repeat(28));
    println!("Estimated value:   {:>8.2}", b.value);

    if let Some(price) = target_price {
        println!("Target price:      {:>8.2}", price);
        println!("Amount owed:       {:>8.2}", amount_owed(price, b.value));
    }
    Ok(())
}

async fn cmd_catalog(config: &SwapConfig) -> Result<()> {
    let client = HttpSwapClient::from_config(config);
    let catalog = Catalog::fetch(&client, config.catalog_limit)
        .await
        .map_err(|e| anyhow!("Failed to load catalog: {}", e))?;

    if catalog.is_empty() {
        println!("No target devices available.");
        return Ok(());
    }

    println!("{:<10}  {:>10}  {}", "ID", "PRICE", "NAME");
    println!("{}", "-".repeat(60));
    for item in catalog.items() {
        println!("{:<10}  {:>10.2}  {}", item.id, item.price, item.name);
    }
    println!("\nTotal: {} devices", catalog.items().len());
    Ok(())
}

fn print_session(session: &WizardSession) {
    println!("Step {} of 3: {}", session.step().number(), session.step());
    println!();

    let pricing = session.pricing();
    println!("{:<4}  {:<28}  {:<10}  {:<6}  {:<12}  {:>6}  {:>8}", "#", "DEVICE", "STORAGE", "RAM", "CONDITION", "PHOTOS", "VALUE");
    println!("{}", "-".repeat(86));
    for (i, (device, value)) in session.devices().iter().zip(&pricing.devices).enumerate() {
        let label = if device.label().is_empty() {
            "-".to_string()
        } else {
            device.label()
        };
        println!(
            "{:<4}  {:<28}  {:<10}  {:<6}  {:<12}  {:>6}  {:>8.2}",
            i + 1,
            label,
            device.storage,
            device.ram,
            device.condition,
            device.images.len(),
            value.value
        );
    }

    println!();
    println!("Total estimated value: {:.2}", pricing.total_estimated_value);
    match (session.target(), pricing.target_price) {
        (Some(target), Some(price)) => {
            println!("Target device:         {} ({:.2})", target.id, price);
            println!("Amount owed:           {:.2}", pricing.amount_owed);
        }
        _ => println!("Target device:         (not chosen)"),
    }

    let contact = session.contact();
    println!("Contact:               {} / {} / {}", or_dash(&contact.full_name), or_dash(&contact.email), or_dash(&contact.phone_number));

    let blockers = session.submit_blockers();
    if blockers.is_empty() {
        println!("\nReady to submit.");
    } else {
        println!("\nBefore submitting:");
        for issue in blockers {
            println!("  - {}", issue);
        }
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn cmd_draft_show(drafts: &dyn DraftStore) -> Result<()> {
    match drafts.load()? {
        Some(session) => print_session(&session),
        None => println!("No pending draft."),
    }
    Ok(())
}

async fn cmd_draft_import(config: &SwapConfig, drafts: &dyn DraftStore, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow!("Failed to read {}: {}", file.display(), e))?;
    let form: DraftForm =
        serde_json::from_str(&raw).map_err(|e| anyhow!("Failed to parse draft form: {}", e))?;

    let wizard = Wizard::new(Arc::new(DataUrlEncoder));
    let applied = wizard.set_device_count(form.devices.len()).device_count();
    if applied != form.devices.len() {
        warn!("Form lists {} devices, using {}", form.devices.len(), applied);
    }
    wizard.go_next();

    let ids: Vec<String> = wizard.snapshot().devices().iter().map(|d| d.id.clone()).collect();
    for (id, device) in ids.iter().zip(form.devices) {
        let battery_health = parse_battery_health(&device.battery_health)?;
        wizard.update_device(
            id,
            DevicePatch {
                category: Some(device.category),
                brand: Some(device.brand),
                model: Some(device.model),
                storage: Some(device.storage),
                ram: Some(device.ram),
                condition: Some(device.condition),
                issues: Some(known_issues(device.issues)),
                battery_health: Some(battery_health),
            },
        );

        if !device.images.is_empty() {
            let files = device.images.into_iter().map(RawImage::from_path).collect();
            let outcome = wizard.attach_images(id, files).await;
            if let Some(warning) = outcome.warning() {
                println!("Warning: {}", warning);
            }
        }
    }
    wizard.go_next();

    wizard.set_contact(Contact {
        email: form.email,
        full_name: form.full_name,
        phone_number: form.phone_number,
    });

    if let Some(target_id) = form.target_device_id {
        let client = HttpSwapClient::from_config(config);
        match Catalog::fetch(&client, config.catalog_limit).await {
            Ok(catalog) => match catalog.select(&target_id) {
                Ok(selection) => {
                    wizard.select_target(selection);
                }
                Err(e) => println!("Warning: {}", e),
            },
            Err(e) => println!("Warning: could not load catalog: {}", e),
        }
    }

    wizard.checkpoint(drafts)?;
    info!("Draft imported from {}", file.display());
    print_session(&wizard.snapshot());
    Ok(())
}

/// Issues from an imported form, listed once each, unknown ones dropped
fn known_issues(issues: Vec<String>) -> Vec<String> {
    let mut known: Vec<String> = Vec::new();
    for issue in issues {
        if !ISSUES.contains(&issue.as_str()) {
            warn!("Ignoring unknown issue '{}'", issue);
        } else if !known.contains(&issue) {
            known.push(issue);
        }
    }
    known
}

async fn cmd_submit(config: &SwapConfig) -> Result<()> {
    let drafts = RedbDraftStore::from_config(config)?;
    let Some(session) = drafts.load()? else {
        println!("No pending draft. Build one with `tradein draft import <FILE>`.");
        return Ok(());
    };

    let client = Arc::new(HttpSwapClient::from_config(config));
    let coordinator = SubmissionCoordinator::new(client, Arc::new(EnvTokenProvider::new()))
        .with_timeout(std::time::Duration::from_secs(config.submit_timeout_secs));

    match coordinator.submit(&session).await {
        Ok(id) => {
            drafts.clear()?;
            println!("Swap request submitted. Reference: {}", id);
            Ok(())
        }
        Err(e) => Err(anyhow!("{} ({:?})", e, e.kind())),
    }
}

async fn cmd_swaps(config: &SwapConfig) -> Result<()> {
    let client = Arc::new(HttpSwapClient::from_config(config));
    let listing = SwapListing::new(client, Arc::new(EnvTokenProvider::new()));

    let views = match listing.load().await {
        ListingState::Loaded(views) => views,
        ListingState::Empty => {
            println!("You have no swap requests yet.");
            return Ok(());
        }
        state => {
            println!("{}", state.message().unwrap_or_default());
            return Ok(());
        }
    };

    println!(
        "{:<8}  {:<24}  {:<10}  {:>10}  {:>10}  {:>10}  {}",
        "ID", "DEVICE", "STATUS", "VALUE", "TARGET", "OWED", "UPDATED"
    );
    println!("{}", "-".repeat(100));
    for view in &views {
        let value = match view.final_value {
            Some(final_value) => format!("{:.2}*", final_value),
            None => format!("{:.2}", view.estimated_value),
        };
        println!(
            "{:<8}  {:<24}  {:<10}  {:>10}  {:>10.2}  {:>10.2}  {}",
            view.id.to_string(),
            view.device_label,
            view.status.to_string(),
            value,
            view.target_device_price,
            view.difference,
            view.updated_at.format("%Y-%m-%d %H:%M UTC")
        );
        if let Some(notes) = view.admin_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            println!("          note: {}", notes);
        }
    }
    println!("\nTotal: {} swap requests (* final value set by our team)", views.len());
    Ok(())
}
