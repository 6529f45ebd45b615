// ============================================================================
// recorder.rs — flockd
// Run recording: one record per analytics sample, interaction event log,
// and CSV / JSON export under a timestamped run directory.
// ============================================================================

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::config::FlockConfig;
use crate::error::FlockResult;
use crate::simulation::FrameOutput;

// ======================== Sample Record ========================

#[derive(Clone, Debug, Serialize)]
pub struct SampleRecord {
    pub frame: u64,
    pub time_ms: f64,
    pub distribution: f32,
    pub right_count: Option<usize>,
    pub centroid: [f32; 3],
    pub mean_speed: f32,
    pub max_speed: f32,
    pub spread: f32,
    pub polarization: f32,
}

impl SampleRecord {
    /// Build a record if this frame took an analytics sample.
    pub fn from_output(output: &FrameOutput) -> Option<Self> {
        let sample = output.sample.as_ref()?;
        let d = &sample.diagnostics;
        Some(Self {
            frame: output.frame,
            time_ms: sample.sampled_at_ms,
            distribution: sample.distribution,
            right_count: sample.counts.map(|c| c.right),
            centroid: output.centroid.to_array(),
            mean_speed: d.mean_speed,
            max_speed: d.max_speed,
            spread: d.spread,
            polarization: d.polarization,
        })
    }

    pub fn csv_header() -> &'static str {
        "frame,time_ms,distribution,right_count,centroid_x,centroid_y,centroid_z,mean_speed,max_speed,spread,polarization"
    }

    pub fn to_csv_line(&self) -> String {
        let right = self.right_count.map(|r| r.to_string()).unwrap_or_default();
        format!(
            "{},{:.1},{:.4},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.4}",
            self.frame, self.time_ms, self.distribution, right,
            self.centroid[0], self.centroid[1], self.centroid[2],
            self.mean_speed, self.max_speed, self.spread, self.polarization,
        )
    }
}

// ======================== Events ========================

#[derive(Clone, Debug, Serialize)]
pub struct RunEvent {
    pub frame: u64,
    pub time_ms: f64,
    pub event_type: String,
    pub details: String,
}

impl RunEvent {
    pub fn to_log_line(&self) -> String {
        format!(
            "[{:.1}ms] frame={} {} {}",
            self.time_ms, self.frame, self.event_type, self.details,
        )
    }
}

// ======================== Run Summary ========================

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub start_time: String,
    pub backend: String,
    pub agent_count: usize,
    pub total_frames: u64,
    pub sample_count: usize,
    pub mean_distribution: f32,
    pub final_distribution: f32,
    pub final_centroid: [f32; 3],
    pub config: FlockConfig,
}

// ======================== Recorder ========================

pub struct Recorder {
    pub run_id: String,
    pub run_start_time: String,
    pub run_dir: PathBuf,
    pub samples: Vec<SampleRecord>,
    pub events: Vec<RunEvent>,
}

impl Recorder {
    /// New recorder writing under `<export_root>/<run_id>/`.
    pub fn new(export_root: impl AsRef<Path>) -> Self {
        let now = Local::now();
        let run_id = format!("run_{}", now.format("%Y%m%d_%H%M%S"));
        Self {
            run_dir: export_root.as_ref().join(&run_id),
            run_id,
            run_start_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            samples: Vec::with_capacity(1_000),
            events: Vec::new(),
        }
    }

    /// Keep the frame's analytics sample, if it has one.
    pub fn record(&mut self, output: &FrameOutput) {
        if let Some(record) = SampleRecord::from_output(output) {
            self.samples.push(record);
        }
    }

    pub fn log_event(&mut self, frame: u64, time_ms: f64, event_type: &str, details: &str) {
        self.events.push(RunEvent {
            frame,
            time_ms,
            event_type: event_type.to_string(),
            details: details.to_string(),
        });
    }

    pub fn summary(&self, config: &FlockConfig, backend: &str, total_frames: u64) -> RunSummary {
        let mean_distribution = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().map(|s| s.distribution).sum::<f32>() / self.samples.len() as f32
        };
        let last = self.samples.last();
        RunSummary {
            run_id: self.run_id.clone(),
            start_time: self.run_start_time.clone(),
            backend: backend.to_string(),
            agent_count: config.agent_count(),
            total_frames,
            sample_count: self.samples.len(),
            mean_distribution,
            final_distribution: last.map_or(0.0, |s| s.distribution),
            final_centroid: last.map_or([0.0; 3], |s| s.centroid),
            config: config.clone(),
        }
    }

    pub fn export_samples_csv(&self) -> FlockResult<PathBuf> {
        let path = self.run_dir.join("samples.csv");
        let mut file = BufWriter::new(fs::File::create(&path)?);
        writeln!(file, "{}", SampleRecord::csv_header())?;
        for record in &self.samples {
            writeln!(file, "{}", record.to_csv_line())?;
        }
        file.flush()?;
        Ok(path)
    }

    pub fn export_events_log(&self) -> FlockResult<PathBuf> {
        let path = self.run_dir.join("events.log");
        let mut file = BufWriter::new(fs::File::create(&path)?);
        for event in &self.events {
            writeln!(file, "{}", event.to_log_line())?;
        }
        file.flush()?;
        Ok(path)
    }

    /// Write samples, events and the JSON summary. Returns the run directory.
    pub fn export(&self, summary: &RunSummary) -> FlockResult<PathBuf> {
        fs::create_dir_all(&self.run_dir)?;
        self.export_samples_csv()?;
        self.export_events_log()?;
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(self.run_dir.join("summary.json"), json)?;
        log::info!(
            "Exported {} samples and {} events to {}",
            self.samples.len(),
            self.events.len(),
            self.run_dir.display()
        );
        Ok(self.run_dir.clone())
    }
}
