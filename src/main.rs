// Entry point and interactive menu.
//
// Each menu choice maps onto one controller operation: pick a view, page
// through trips, filter, refresh, export or inspect a single trip.
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use taxi_dashboard::config::Config;
use taxi_dashboard::controller::{Activation, View, ViewController};
use taxi_dashboard::error::ExportError;
use taxi_dashboard::export::write_export;
use taxi_dashboard::gateway::{HttpGateway, TripFilter};
use taxi_dashboard::output::{render_table, Renderer, RowSpec, TerminalRenderer};
use taxi_dashboard::util::{parse_date_safe, parse_f64_safe};

fn setup_logging(config: &Config) {
    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let debug_log = config.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::DEBUG),
            ),
            Err(e) => {
                eprintln!("Could not open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(stderr_log)
        .with(debug_log)
        .init();
}

/// Print `prompt` and read one trimmed line. `None` once input is closed.
fn read_line_from(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_line(prompt: &str) -> Option<String> {
    read_line_from(&mut io::stdin().lock(), prompt)
}

fn print_menu() {
    println!("Select View:");
    for (i, view) in View::ALL.iter().enumerate() {
        println!("[{}] {}", i + 1, view.title());
    }
    println!("[n] Next page   [p] Previous page   [f] Filter trips   [d] Trip details");
    println!("[r] Refresh     [e] Export CSV      [q] Quit\n");
}

/// Ask for each filter field; a blank answer leaves it unset.
fn prompt_filter() -> Option<TripFilter> {
    let text = |prompt: &str| read_line(prompt).filter(|s| !s.is_empty());

    let start_date = text("Start date (YYYY-MM-DD): ");
    let end_date = text("End date (YYYY-MM-DD): ");
    let pickup_zone = text("Pickup zone: ");
    let dropoff_zone = text("Dropoff zone: ");
    let min_fare = text("Min fare: ");
    let max_fare = text("Max fare: ");

    let date = |raw: &Option<String>, name: &str| match raw {
        None => Some(None),
        Some(s) => match parse_date_safe(Some(s.as_str())) {
            Some(d) => Some(Some(d)),
            None => {
                println!("Invalid {}. Please use YYYY-MM-DD.\n", name);
                None
            }
        },
    };
    let fare = |raw: &Option<String>, name: &str| match raw {
        None => Some(None),
        Some(s) => match parse_f64_safe(Some(s.as_str())) {
            Some(v) => Some(Some(v)),
            None => {
                println!("{} must be numeric.\n", name);
                None
            }
        },
    };

    Some(TripFilter {
        start_date: date(&start_date, "start date")?,
        end_date: date(&end_date, "end date")?,
        pickup_zone,
        dropoff_zone,
        min_fare: fare(&min_fare, "Min fare")?,
        max_fare: fare(&max_fare, "Max fare")?,
    })
}

fn show(renderer: &mut TerminalRenderer, activation: Activation) {
    match activation {
        Activation::Rendered(frame) => renderer.render(&frame),
        // The newer activation renders its own frame.
        Activation::Superseded { .. } => {}
    }
}

fn handle_export(renderer: &mut TerminalRenderer, controller: &ViewController, config: &Config) {
    let result = controller
        .export()
        .and_then(|payload| write_export(&config.export_dir, &payload));
    match result {
        Ok(path) => renderer.notify(&format!("Exported to {}", path.display())),
        Err(ExportError::NothingToExport) => renderer.notify("No data to export"),
        Err(e) => {
            tracing::error!("export failed: {e}");
            renderer.notify(&format!("Export failed: {}", e));
        }
    }
}

fn handle_detail(renderer: &mut TerminalRenderer, controller: &ViewController) {
    let choice = read_line("Row number: ").unwrap_or_default();
    let detail = choice
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| controller.trip_detail(n - 1));
    match detail {
        Some(rows) => {
            let header = RowSpec::new(["Trip Details", ""]);
            renderer.notify(&render_table(&header, &rows));
        }
        None => renderer.notify("No such trip on this page."),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    setup_logging(&config);

    let gateway = HttpGateway::new(&config.api_base, config.timeout())?;
    let controller = ViewController::new(Arc::new(gateway), config.page_size);
    let mut renderer = TerminalRenderer::default();

    tracing::info!("using API at {}", config.api_base);
    show(&mut renderer, controller.activate(View::Overview).await);

    loop {
        print_menu();
        let Some(choice) = read_line("Enter choice: ") else {
            println!();
            break;
        };
        let choice = choice.to_lowercase();
        let activation = match choice.as_str() {
            "1" | "2" | "3" | "4" => {
                let index = choice.parse::<usize>().unwrap_or(1) - 1;
                controller.activate(View::ALL[index]).await
            }
            "n" => controller.next_page().await,
            "p" => controller.prev_page().await,
            "f" => match prompt_filter() {
                Some(filter) => controller.apply_filter(filter).await,
                None => continue,
            },
            "r" => controller.refresh().await,
            "e" => {
                handle_export(&mut renderer, &controller, &config);
                continue;
            }
            "d" => {
                handle_detail(&mut renderer, &controller);
                continue;
            }
            "q" => {
                println!("Exiting the program.");
                break;
            }
            _ => {
                println!("Invalid choice.\n");
                continue;
            }
        };
        show(&mut renderer, activation);
    }
    Ok(())
}
