use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Arg, ArgAction, Command};
use halflife_curves::{
    example_data::ExampleDataGenerator,
    models::*,
    output::OutputManager,
    parser::{format_timestamp, parse_timestamp, StateParser},
    summary::SummaryCalculator,
    CurveBuilder, DecayError,
};
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("Half-life Curve Renderer")
        .version("0.1")
        .about("Renders additive first-order decay curves for dosed substances")
        .arg(
            Arg::new("state")
                .short('s')
                .long("state")
                .value_name("FILE")
                .help("JSON state document with substances and doses")
                .required_unless_present("generate-example"),
        )
        .arg(
            Arg::new("doses")
                .short('d')
                .long("doses")
                .value_name("FILE")
                .help("CSV dose log (DOSE_ID,DRUG_ID,AMOUNT,TIME) merged into the state"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for rendered series")
                .default_value("./curve_results"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("ISO8601")
                .help("Window start (defaults to the first dose)"),
        )
        .arg(
            Arg::new("end")
                .long("end")
                .value_name("ISO8601")
                .help("Window end (defaults to the last dose plus --days)"),
        )
        .arg(
            Arg::new("days")
                .long("days")
                .value_name("DAYS")
                .help("Days shown after the last dose when --end is absent")
                .default_value("14"),
        )
        .arg(
            Arg::new("density")
                .long("density")
                .value_name("N")
                .help("Minimum samples per half-life")
                .default_value("10"),
        )
        .arg(
            Arg::new("max-points")
                .long("max-points")
                .value_name("N")
                .help("Upper bound on regular samples per curve")
                .default_value("4000"),
        )
        .arg(
            Arg::new("guard-fraction")
                .long("guard-fraction")
                .value_name("FRACTION")
                .help("Offset of the guard samples around each dose, as a fraction of the half-life")
                .default_value("0.1"),
        )
        .arg(
            Arg::new("units")
                .long("units")
                .value_name("UNITS")
                .help("Amount units")
                .default_value("mg"),
        )
        .arg(
            Arg::new("generate-example")
                .long("generate-example")
                .help("Write an example state document to the output directory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("substances")
                .short('n')
                .long("substances")
                .value_name("NUMBER")
                .help("Number of substances in the example state")
                .default_value("3"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Initialize logging
    if matches.get_flag("verbose") {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let output_dir = PathBuf::from(string_arg(&matches, "output")?);

    let state_path = if matches.get_flag("generate-example") {
        let n_substances: usize = string_arg(&matches, "substances")?
            .parse()
            .context("Invalid number of substances")?;

        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Cannot create {}", output_dir.display()))?;
        let example_file = output_dir.join("example_state.json");
        let start = Utc::now().timestamp_millis() - 7 * 24 * 3_600_000;
        ExampleDataGenerator::generate_state_file(&example_file, n_substances, start)?;
        println!("Generated example state: {}", example_file.display());

        match matches.get_one::<String>("state") {
            Some(path) => PathBuf::from(path),
            None => example_file,
        }
    } else {
        PathBuf::from(string_arg(&matches, "state")?)
    };

    run_render(&state_path, &output_dir, &matches)
}

fn run_render(state_path: &Path, output_dir: &Path, matches: &clap::ArgMatches) -> anyhow::Result<()> {
    println!("Rendering concentration curves...");
    println!("State file: {}", state_path.display());

    // Load state and merge any dose log
    let mut snapshot = StateParser::load_state(state_path)
        .with_context(|| format!("Cannot load state from {}", state_path.display()))?;

    if let Some(dose_log) = matches.get_one::<String>("doses") {
        let doses = StateParser::parse_dose_log(dose_log)
            .with_context(|| format!("Cannot read dose log {}", dose_log))?;
        let (merged, added) = snapshot.merge_doses(doses);
        println!("Merged {} doses from {}", added, dose_log);
        snapshot = merged;
    }

    let config = create_render_config(matches, &snapshot, output_dir)?;
    println!(
        "Window: {} .. {}",
        format_timestamp(config.window.start)?,
        format_timestamp(config.window.end)?
    );

    // Build curves
    let builder = CurveBuilder::with_config(config.sampler.clone())?;
    let curves = builder.build(&snapshot, &config.window)?;
    let summaries = SummaryCalculator::summarize_all(&curves, &snapshot);

    // Save results
    OutputManager::save_results(&curves, &summaries, &config, output_dir)?;

    print_render_summary(&curves, &summaries, &config)?;
    Ok(())
}

fn create_render_config(
    matches: &clap::ArgMatches,
    snapshot: &StateSnapshot,
    output_dir: &Path,
) -> anyhow::Result<RenderConfig> {
    let sampler = SamplerConfig {
        samples_per_half_life: string_arg(matches, "density")?
            .parse()
            .context("Invalid --density")?,
        max_intervals: string_arg(matches, "max-points")?
            .parse()
            .context("Invalid --max-points")?,
        guard_fraction: string_arg(matches, "guard-fraction")?
            .parse()
            .context("Invalid --guard-fraction")?,
        ..SamplerConfig::default()
    };
    let sampler = SamplerConfig {
        min_intervals: sampler.min_intervals.min(sampler.max_intervals),
        ..sampler
    };

    // Window bounds: explicit flags first, then the dose history
    let days: f64 = string_arg(matches, "days")?.parse().context("Invalid --days")?;
    let span = snapshot.dose_span();
    let now = Utc::now().timestamp_millis();

    let start = match matches.get_one::<String>("start") {
        Some(value) => parse_timestamp(value).context("Invalid --start")?,
        None => span.map_or(now, |(first, _)| first),
    };
    let end = match matches.get_one::<String>("end") {
        Some(value) => parse_timestamp(value).context("Invalid --end")?,
        None => {
            let last = span.map_or(start, |(_, last)| last.max(start));
            extend_by_days(last, days)?
        }
    };
    if start > end {
        bail!("Window start is after window end");
    }

    Ok(RenderConfig {
        sampler,
        window: TimeWindow::new(start, end)?,
        output_path: output_dir.to_string_lossy().to_string(),
        concentration_units: string_arg(matches, "units")?.clone(),
        time_units: "h".to_string(),
    })
}

/// Instant `days` after `last`, rejecting lengths that leave the i64 range.
fn extend_by_days(last: Instant, days: f64) -> anyhow::Result<Instant> {
    if !days.is_finite() || days < 0.0 {
        return Err(DecayError::InvalidWindow(format!(
            "--days must be a non-negative number (got {})",
            days
        ))
        .into());
    }
    let end = last
        .checked_add((days * 24.0 * MS_PER_HOUR).round() as i64)
        .ok_or_else(|| {
            DecayError::InvalidWindow(format!("{} days after the last dose is out of range", days))
        })?;
    Ok(end)
}

fn string_arg<'a>(matches: &'a clap::ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("Missing argument --{}", name))
}

fn print_render_summary(
    curves: &CurveSet,
    summaries: &[CurveSummary],
    config: &RenderConfig,
) -> anyhow::Result<()> {
    println!("\n=== RENDER SUMMARY ===");
    println!("Curves rendered: {}", curves.curves.len());
    if !curves.rejected.is_empty() {
        println!("Skipped substances: {}", curves.rejected.len());
        for rejected in &curves.rejected {
            println!("  {}: {}", rejected.substance_id, rejected.reason);
        }
    }

    for summary in summaries {
        println!(
            "  {}: peak {:.3} {} at {}, {:.3} {} at window end",
            summary.name,
            summary.peak,
            config.concentration_units,
            format_timestamp(summary.peak_time)?,
            summary.final_concentration,
            config.concentration_units
        );
    }

    println!("\nResults saved to {}", config.output_path);
    Ok(())
}
