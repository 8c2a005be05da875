#![deny(clippy::all)]

use anyhow::Context;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use transcript_annotator::gate::{GateState, ManualClock};
use transcript_annotator::persistence::{DraftCache, RestBackend};
use transcript_annotator::segments::Assignment;
use transcript_annotator::{AppError, Config, EditorSession};

const PREVIEW_CHARS: usize = 60;

fn usage() -> ! {
    eprintln!("Usage: transcript-annotator <video-id>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(video_id) = std::env::args().nth(1) else {
        usage();
    };

    // Load configuration from embedded config.toml and the environment
    let config = Config::load().context("Failed to load configuration")?;

    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = RestBackend::new(&config.api)?;
    let drafts = DraftCache::from_config(&config.drafts).context("Failed to locate draft directory")?;
    info!(dir = ?drafts.dir(), "Using draft cache");

    let mut session = EditorSession::new(backend, drafts, ManualClock::new(None), &config, &video_id);
    let now = Utc::now();
    let summary = match session.load(now).await {
        Ok(summary) => summary,
        Err(AppError::NotFound { video_id }) => {
            eprintln!("No transcript exists for video {video_id}");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to load transcript"),
    };

    println!(
        "Transcript {} ({:?}): {} segments, {} speakers, {} sections, {} tag groups",
        session.transcript_id().unwrap_or("-"),
        summary.source,
        summary.segments,
        summary.speakers,
        summary.sections,
        summary.tag_groups
    );

    for (index, segment) in session.store().iter().enumerate() {
        let who = match &segment.assignment {
            Assignment::Speaker(id) => session
                .roster()
                .get(id)
                .map_or_else(|| id.to_string(), |s| s.name.clone()),
            Assignment::State(state) => format!("[{state}]"),
            Assignment::Unassigned => "(unassigned)".to_string(),
        };
        let end = segment
            .end_time_seconds
            .map_or_else(|| "open".to_string(), |end| format!("{end:.1}"));
        let preview: String = segment.content.chars().take(PREVIEW_CHARS).collect();
        println!(
            "{index:>4}  {:>7.1}-{end:<7} {who:<20} {preview}",
            segment.start_time_seconds
        );
    }

    match session.gate().state(session.store(), now) {
        GateState::Assigned => println!("Gate: open"),
        GateState::UnassignedFresh { remaining_secs } => {
            println!("Gate: waiting for assignment ({remaining_secs:.1}s left)")
        }
        GateState::UnassignedExpired => println!("Gate: blocked until the segment is assigned"),
    }

    for section in session.structure().sections() {
        let end = section
            .end_block_index
            .map_or_else(|| "open".to_string(), |end| end.to_string());
        println!("Section \"{}\": blocks {}..{end}", section.name, section.start_block_index);
        for sub in session.structure().subsections_of(&section.id) {
            let end = sub
                .end_block_index
                .map_or_else(|| "open".to_string(), |end| end.to_string());
            println!("  Subsection \"{}\": blocks {}..{end}", sub.name, sub.start_block_index);
        }
    }

    for master in session.tags().masters() {
        let labels: Vec<String> = session
            .tags()
            .groups_of(&master.id)
            .flat_map(|g| g.primary_tags.iter().map(|p| p.label().to_string()))
            .collect();
        println!("Tag \"{}\" {}: {}", master.name, master.color, labels.join(", "));
    }

    Ok(())
}
