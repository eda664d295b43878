use crate::{models::*, parser::format_timestamp, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub struct OutputManager;

impl OutputManager {
    pub fn save_results<P: AsRef<Path>>(
        curves: &CurveSet,
        summaries: &[CurveSummary],
        config: &RenderConfig,
        output_path: P,
    ) -> Result<()> {
        let output_dir = output_path.as_ref();
        fs::create_dir_all(output_dir)?;

        // Save curve series and markers
        Self::save_decay_curves(curves, output_dir)?;
        Self::save_dose_markers(curves, output_dir)?;

        // Save summaries and the full curve set
        Self::save_summary(summaries, output_dir)?;
        Self::save_json_results(curves, output_dir)?;

        // Generate report
        Self::generate_render_report(curves, summaries, config, output_dir)?;

        log::info!("Results saved to: {}", output_dir.display());
        Ok(())
    }

    fn save_decay_curves(curves: &CurveSet, output_dir: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(output_dir.join("decay_curves.csv"))?;

        // Write header
        writer.write_record(["SUBSTANCE_ID", "TIME", "TIME_MS", "CONCENTRATION"])?;

        // One row per sampled point, curves in build order
        for curve in &curves.curves {
            for point in &curve.decay_curve {
                writer.write_record(&[
                    curve.substance_id.clone(),
                    format_timestamp(point.time)?,
                    point.time.to_string(),
                    point.concentration.to_string(),
                ])?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn save_dose_markers(curves: &CurveSet, output_dir: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(output_dir.join("dose_markers.csv"))?;
        // Write header
        writer.write_record(["SUBSTANCE_ID", "DOSE_ID", "TIME", "TIME_MS", "CONCENTRATION"])?;

        for curve in &curves.curves {
            for marker in &curve.dose_markers {
                writer.write_record(&[
                    curve.substance_id.clone(),
                    marker.dose_id.clone().unwrap_or_default(),
                    format_timestamp(marker.time)?,
                    marker.time.to_string(),
                    marker.concentration.to_string(),
                ])?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn save_summary(summaries: &[CurveSummary], output_dir: &Path) -> Result<()> {
        let file_path = output_dir.join("summary.csv");
        let mut file = File::create(file_path)?;

        // Write header
        writeln!(file, "SUBSTANCE_ID,NAME,N_DOSES,TOTAL_DOSED,PEAK,PEAK_TIME,TROUGH,FINAL,MEAN,AUC")?;

        for s in summaries {
            writeln!(
                file,
                "{},{},{},{:.6},{:.6},{},{:.6},{:.6},{:.6},{:.6}",
                s.substance_id,
                s.name.replace(',', " "),
                s.n_doses,
                s.total_dosed,
                s.peak,
                format_timestamp(s.peak_time)?,
                s.trough,
                s.final_concentration,
                s.mean_concentration,
                s.auc,
            )?;
        }

        Ok(())
    }

    fn save_json_results(curves: &CurveSet, output_dir: &Path) -> Result<()> {
        let file_path = output_dir.join("complete_results.json");
        let json_string = serde_json::to_string_pretty(curves)?;
        fs::write(file_path, json_string)?;
        Ok(())
    }

    fn generate_render_report(
        curves: &CurveSet,
        summaries: &[CurveSummary],
        config: &RenderConfig,
        output_dir: &Path,
    ) -> Result<()> {
        let file_path = output_dir.join("render_report.md");
        let mut file = File::create(file_path)?;
        let units = &config.concentration_units;

        // Title
        writeln!(file, "# Concentration Curve Report")?;
        writeln!(file)?;

        // Window and sampling settings
        writeln!(file, "## Window")?;
        writeln!(file, "- Start: {}", format_timestamp(curves.window.start)?)?;
        writeln!(file, "- End: {}", format_timestamp(curves.window.end)?)?;
        writeln!(file, "- Duration: {:.1} {}", curves.window.duration_hours(), config.time_units)?;
        writeln!(file)?;

        writeln!(file, "## Sampling")?;
        writeln!(file, "- Samples per half-life: {}", config.sampler.samples_per_half_life)?;
        writeln!(
            file,
            "- Interval floor/ceiling: {}/{}",
            config.sampler.min_intervals, config.sampler.max_intervals
        )?;
        writeln!(file, "- Dose guard fraction: {}", config.sampler.guard_fraction)?;
        writeln!(file)?;

        // Per-substance results
        writeln!(file, "## Substances")?;
        for summary in summaries {
            let points = curves
                .curve(&summary.substance_id)
                .map_or(0, |c| c.decay_curve.len());
            writeln!(file, "### {} ({})", summary.name, summary.substance_id)?;
            writeln!(file, "- Doses in window: {} ({:.1} {} total)", summary.n_doses, summary.total_dosed, units)?;
            writeln!(
                file,
                "- Peak: {:.3} {} at {}",
                summary.peak,
                units,
                format_timestamp(summary.peak_time)?
            )?;
            writeln!(file, "- Trough: {:.3} {}", summary.trough, units)?;
            writeln!(file, "- At window end: {:.3} {}", summary.final_concentration, units)?;
            writeln!(file, "- Time-weighted mean: {:.3} {}", summary.mean_concentration, units)?;
            writeln!(file, "- AUC: {:.3} {}·h", summary.auc, units)?;
            writeln!(file, "- Curve points: {}", points)?;
            writeln!(file)?;
        }

        // Substances left out of the render
        if !curves.rejected.is_empty() {
            writeln!(file, "## Skipped substances")?;
            for rejected in &curves.rejected {
                writeln!(file, "- {}: {}", rejected.substance_id, rejected.reason)?;
            }
        }

        Ok(())
    }
}
