// ABOUTME: Command-line interface for the workout roulette engine.
// ABOUTME: Provides spin, stats, simulation, and catalog commands with optional JSON output.

use clap::{Parser, Subcommand};
use roulette::{
    compute_stats, format_expected, format_percent, spawn_simulation, spin_many, Catalog, FastRng,
    GroupKey, SimResult, Stats,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roulette")]
#[command(about = "Spin the workout roulette and inspect its odds")]
#[command(version)]
struct Cli {
    /// Load the catalog from a TOML file instead of the built-in one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Use the legacy weight-based catalog
    #[arg(long, global = true, conflicts_with = "catalog")]
    legacy: bool,

    /// Shuffle the catalog before use
    #[arg(long, global = true)]
    shuffle: bool,

    /// Seed for reproducible spins, shuffles, and simulations
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spin the roulette
    Spin {
        /// Number of spins
        #[arg(short, long, default_value = "1")]
        count: usize,
    },
    /// Show the closed-form statistics of the catalog
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Simulate many workouts and compare against the statistics
    Sim {
        /// Target number of spins (10, 100, 1000, ... 1000000)
        #[arg(short, long, default_value = "10000")]
        n: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the catalog items and their odds
    Catalog,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "roulette=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let catalog = match load_catalog(&cli) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut rng = match cli.seed {
        Some(seed) => FastRng::with_seed(seed),
        None => FastRng::new(),
    };
    let catalog = if cli.shuffle {
        catalog.shuffled(&mut rng)
    } else {
        catalog
    };

    match cli.command {
        Commands::Spin { count } => {
            for index in spin_many(&catalog, count, &mut rng) {
                let item = &catalog.items()[index];
                if item.is_exit {
                    println!("{} (workout over)", item.name);
                } else {
                    println!("{} ({} min)", item.name, item.clamped_duration());
                }
            }
        }
        Commands::Stats { json } => {
            let stats = compute_stats(&catalog);
            if json {
                print_json(&stats);
            } else {
                print_stats(&stats);
            }
        }
        Commands::Sim { n, json } => {
            let handle = spawn_simulation(catalog, n, cli.seed);
            match handle.join() {
                Ok(result) => {
                    if json {
                        print_sim_json(&result);
                    } else {
                        print_sim_report(n, &result);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Catalog => print_catalog(&catalog),
    }
}

fn load_catalog(cli: &Cli) -> roulette::Result<Catalog> {
    if let Some(path) = &cli.catalog {
        Catalog::load(path)
    } else if cli.legacy {
        Ok(Catalog::legacy_weighted())
    } else {
        Ok(Catalog::workout())
    }
}

fn group_label(key: &GroupKey) -> String {
    match key {
        GroupKey::Tier(tier) => tier.to_string(),
        GroupKey::Weight(w) => format!("weight {}", w),
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &Stats) {
    println!("exit chance per spin:    {}", format_percent(stats.exit_probability));
    println!("expected spins:          {}", format_expected(stats.expected_spins_until_end));
    println!("expected exercises:      {}", format_expected(stats.expected_exercises_before_end));
    println!("minutes per exercise:    {:.1}", stats.expected_duration_per_spin);
    println!("expected workout:        {} min", format_expected(stats.expected_total_duration));
    if stats.uses_uniform_fallback {
        println!("(no usable weights, every item equally likely)");
    }

    if let Some(target) = &stats.target {
        println!();
        println!(
            "{}: {} of workouts end here, one every {} workouts",
            target.name,
            format_percent(target.given_exit),
            format_expected(target.expected_runs_until_target)
        );
    }

    println!();
    println!(
        "{:<12} {:>8} {:>9} {:>10} {:>14}",
        "group", "chance", "per item", "hits/run", "runs until hit"
    );
    for group in &stats.groups {
        println!(
            "{:<12} {:>8} {:>9} {:>10} {:>14}{}",
            group_label(&group.key),
            format_percent(group.group_probability),
            format_percent(group.per_item_probability),
            format_expected(group.expected_hits_per_workout),
            format_expected(group.workouts_until_hit()),
            if group.has_exit { "  (exit)" } else { "" }
        );
    }

    println!();
    for (label, milestone) in [("median", &stats.median_length), ("typical", &stats.typical_length)] {
        println!(
            "{} workout: {} spins, {} chance of being done, {} min",
            label,
            format_expected(milestone.spins),
            format_percent(milestone.chance),
            format_expected(milestone.duration)
        );
    }

    println!();
    println!("{:>5} {:>9} {:>9} {:>8}", "spin", "ends on", "by then", "minutes");
    for point in &stats.length_curve {
        println!(
            "{:>5} {:>9} {:>9} {:>8.0}",
            point.spins,
            format_percent(point.probability_end_on_spin),
            format_percent(point.cumulative_probability),
            point.duration_at_spin
        );
    }
}

fn print_sim_json(result: &SimResult) {
    use serde_json::json;

    let output = json!({
        "total_draws": result.total_draws,
        "runs": result.runs,
        "aborted_runs": result.aborted_runs,
        "exit_frequency": result.exit_frequency,
        "expected_exit_probability": result.expected_exit_probability,
        "mean_length": result.mean_length,
        "std_dev": result.std_dev,
        "expected_length": result.expected_length,
        "chi_squared": result.chi_squared(),
        "groups": result.group_frequencies,
        "length_histogram": result.length_histogram,
    });

    print_json(&output);
}

fn print_sim_report(target: usize, result: &SimResult) {
    println!(
        "{} spins over {} workouts (target {})",
        result.total_draws, result.runs, target
    );
    if result.aborted_runs > 0 {
        println!("{} workouts stopped at the safety cap", result.aborted_runs);
    }
    println!();

    println!("{:<12} {:>9} {:>9} {:>9} {:>9}", "group", "expected", "actual", "count", "delta");
    for group in &result.group_frequencies {
        println!(
            "{:<12} {:>8.2}% {:>8.2}% {:>9} {:>+8.3}%",
            group_label(&group.key),
            group.expected * 100.0,
            group.actual * 100.0,
            group.count,
            group.delta() * 100.0
        );
    }
    println!(
        "chi-squared: {:.2} ({} degrees of freedom)",
        result.chi_squared(),
        result.degrees_of_freedom()
    );

    println!();
    println!(
        "workout length: mean {:.2}, std {:.2}, expected {}",
        result.mean_length,
        result.std_dev,
        format_expected(result.expected_length)
    );
    println!();

    let window = result.histogram_window();
    let expected = result.expected_histogram();
    let max_count = window.iter().map(|(_, c)| *c).max().unwrap_or(1).max(1);
    let max_bar_width = 40;

    for ((length, count), (_, want)) in window.iter().zip(&expected) {
        let bar_width = (*count as f64 / max_count as f64 * max_bar_width as f64) as usize;
        let bar: String = "█".repeat(bar_width);
        println!("{:>4}: {:40} {:>7} ({:.0} expected)", length, bar, count, want);
    }
}

fn print_catalog(catalog: &Catalog) {
    let probabilities = catalog.item_probabilities();
    for (item, probability) in catalog.items().iter().zip(probabilities) {
        let odds = match item.odds {
            roulette::Odds::Tier(tier) => format!("{} ({})", tier, tier.category()),
            roulette::Odds::Weight(w) => format!("weight {}", w),
        };
        println!(
            "{:<26} {:<22} {:>8} {:>5} min{}",
            item.name,
            odds,
            format_percent(probability),
            item.clamped_duration(),
            if item.is_exit { "  exit" } else { "" }
        );
    }
}
