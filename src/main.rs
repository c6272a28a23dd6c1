use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use price_watch::PriceWatch;
use price_watch::cache::SystemClock;
use price_watch::catalog::{Catalog, TargetDraft, TargetStore, parse_import};
use price_watch::config::Settings;
use price_watch::discord::DiscordNotifier;
use price_watch::pagination::{NavigationEvent, RenderedPage, SELECT_MENU_ID, SurfaceId};
use price_watch::price_watch::{render_invalid, render_prices};

#[derive(Parser)]
#[command(name = "price-watch", about = "Monitor product pages for price and stock changes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Commands accepted inside `serve`
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct Shell {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every target and show the status pages
    Products {
        /// Page to show, starting at 1
        #[arg(long)]
        page: Option<usize>,
        /// Also post the page to the Discord webhook
        #[arg(long)]
        notify: bool,
    },
    /// Show targets whose last scrape failed
    Invalid {
        #[arg(long)]
        notify: bool,
    },
    /// Find targets priced closest to a value
    Prices { target: f64 },
    /// Start monitoring a new page
    Add {
        name: String,
        url: String,
        #[arg(long)]
        price_selector: Option<String>,
        #[arg(long)]
        stock_selector: Option<String>,
        #[arg(long)]
        check_text: Option<String>,
    },
    /// Stop monitoring a target; remaining IDs are renumbered
    Remove { id: u32 },
    /// Remove several targets, e.g. `bulk-remove 1,4,5`
    BulkRemove { ids: String },
    /// Import targets from a JSON array
    BulkAdd { file: PathBuf },
    /// List monitored targets
    List,
    /// Press a page button on a paged view (serve only)
    Page { surface: SurfaceId, index: usize },
    /// Choose a page from the menu of a paged view (serve only)
    Select { surface: SurfaceId, index: usize },
    /// Read commands from stdin until EOF
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let catalog = Catalog::connect(&settings.database_url).await?;
    let watch = PriceWatch::new(
        Arc::new(catalog.clone()),
        PriceWatch::default_strategies(&settings)?,
        &settings,
        Arc::new(SystemClock),
    );
    let notifier = DiscordNotifier::new(settings.discord_webhook_url.clone());

    let app = App {
        watch,
        catalog,
        notifier,
    };

    match cli.command {
        Command::Serve => app.serve().await,
        command => app.execute(command, false).await,
    }
}

struct App {
    watch: PriceWatch,
    catalog: Catalog,
    notifier: DiscordNotifier,
}

impl App {
    async fn serve(&self) -> Result<()> {
        let sched = JobScheduler::new().await?;

        let job_watch = self.watch.clone();
        sched
            .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
                let watch = job_watch.clone();
                Box::pin(async move {
                    watch.sweep().await;
                })
            })?)
            .await?;
        sched.start().await?;
        info!("Cache sweep scheduled every minute, reading commands from stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let args = split_args(&line);
            if args.is_empty() {
                continue;
            }

            match Shell::try_parse_from(args) {
                Ok(Shell {
                    command: Command::Serve,
                }) => println!("Already serving"),
                Ok(shell) => {
                    if let Err(e) = self.execute(shell.command, true).await {
                        error!("Command failed: {:#}", e);
                        println!("❌ Error: {e}");
                    }
                }
                Err(e) => println!("{e}"),
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    async fn execute(&self, command: Command, interactive: bool) -> Result<()> {
        match command {
            Command::Products { page, notify } => {
                let Some((surface, mut shown)) = self.watch.products().await? else {
                    println!("No products to monitor. Add products using the add command.");
                    return Ok(());
                };
                if let Some(page) = page.filter(|p| *p > 1) {
                    let event = NavigationEvent::Button {
                        custom_id: format!("page_{}", page - 1),
                    };
                    shown = self.watch.navigate(surface, &event).await?;
                }
                print_page(surface, &shown, interactive);
                if notify {
                    self.notifier.send_page(&shown).await?;
                }
            }
            Command::Invalid { notify } => {
                let report = render_invalid(&self.watch.invalid().await?);
                println!("{report}");
                if notify {
                    self.notifier.send_text(&report).await?;
                }
            }
            Command::Prices { target } => {
                let answer = self.watch.prices(target).await?;
                println!("{}", render_prices(target, &answer));
            }
            Command::Add {
                name,
                url,
                price_selector,
                stock_selector,
                check_text,
            } => {
                let target = self
                    .catalog
                    .add(TargetDraft {
                        price_selector,
                        stock_selector,
                        check_text,
                        ..TargetDraft::new(name, url)
                    })
                    .await?;
                println!("✅ Added product: **{}** (ID: {})\n{}", target.name, target.id, target.url);
            }
            Command::Remove { id } => {
                let target = self.catalog.remove(id).await?;
                println!("✅ Removed product: **{}** (ID: {})", target.name, id);
            }
            Command::BulkRemove { ids } => {
                let ids = parse_ids(&ids)?;
                let removed = self.catalog.remove_many(&ids).await?;
                let lines: Vec<String> = removed.iter().map(|t| format!("{}: {}", t.id, t.name)).collect();
                println!("✅ Removed {} products:\n{}", removed.len(), lines.join("\n"));
            }
            Command::BulkAdd { file } => {
                let json = tokio::fs::read_to_string(&file).await?;
                let added = self.catalog.bulk_import(parse_import(&json)?).await?;
                let lines: Vec<String> = added.iter().map(|t| format!("{}: {}", t.id, t.name)).collect();
                println!("✅ Added {} products:\n{}", added.len(), lines.join("\n"));
            }
            Command::List => {
                for target in self.catalog.list().await? {
                    println!("[{}] {} - {}", target.id, target.name, target.url);
                }
            }
            Command::Page { .. } | Command::Select { .. } if !interactive => {
                bail!("Page navigation needs a live view; use it inside `serve`");
            }
            Command::Page { surface, index } => {
                let event = NavigationEvent::Button {
                    custom_id: format!("page_{}", index.saturating_sub(1)),
                };
                print_page(surface, &self.watch.navigate(surface, &event).await?, interactive);
            }
            Command::Select { surface, index } => {
                let event = NavigationEvent::Select {
                    custom_id: SELECT_MENU_ID.to_string(),
                    values: vec![index.saturating_sub(1).to_string()],
                };
                print_page(surface, &self.watch.navigate(surface, &event).await?, interactive);
            }
            Command::Serve => bail!("Already serving"),
        }

        Ok(())
    }
}

fn print_page(surface: SurfaceId, page: &RenderedPage, interactive: bool) {
    println!("{}", page.content);
    if interactive {
        println!("\n(view {surface}: use `page {surface} <n>` or `select {surface} <n>`)");
    }
}

fn parse_ids(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(|id| {
            id.trim()
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("Invalid IDs format. Please use comma-separated numbers."))
        })
        .collect()
}

/// Splits a command line on whitespace, keeping double-quoted runs together.
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_arg = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_arg = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}
