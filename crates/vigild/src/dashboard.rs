//! Terminal dashboard: renders the pipeline's latest payload as ANSI
//! text and drives enrollment from stdin.
//!
//! Key protocol while running: `r` arms enrollment, a non-empty line
//! saves the held capture under that name, an empty line cancels, `q`
//! quits.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vigil_core::{OverlayColor, PipelineEvent, RenderFrame};

use crate::runtime::{PipelineRuntime, RuntimeEvent};

const CLEAR: &str = "\x1b[2J\x1b[H";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Event lines kept on screen.
const RECENT_EVENTS: usize = 6;

fn color_code(color: OverlayColor) -> &'static str {
    match color {
        OverlayColor::Red => "\x1b[31m",
        OverlayColor::Yellow => "\x1b[33m",
        OverlayColor::Green => "\x1b[32m",
    }
}

/// Render one frame of the dashboard. Pure text assembly; printing and
/// pacing stay with the caller.
pub fn render_text(frame: &RenderFrame, recent: &VecDeque<String>) -> String {
    let mut out = String::new();
    out.push_str(CLEAR);

    let d = &frame.dashboard;
    out.push_str(&format!(
        "{BOLD}VIGIL{RESET}  mode {} | fps {:.1} | faces {}\n",
        d.mode, d.fps, d.faces
    ));
    out.push_str(&"-".repeat(60));
    out.push('\n');

    if frame.overlays.is_empty() {
        out.push_str("no faces in view\n");
    }
    for overlay in &frame.overlays {
        let color = color_code(overlay.color);
        let b = &overlay.bbox;
        out.push_str(color);
        for (i, label) in overlay.labels.iter().enumerate() {
            if i == 0 {
                out.push_str(&format!(
                    "{label}   [{},{} {}x{}]\n",
                    b.x1,
                    b.y1,
                    b.width(),
                    b.height()
                ));
            } else {
                out.push_str(&format!("    {label}\n"));
            }
        }
        if let Some(challenge) = &overlay.challenge {
            out.push_str(&format!(
                "    Liveness: {} ({})\n",
                challenge.kind, challenge.status
            ));
        }
        if !overlay.quality_reasons.is_empty() {
            let reasons: Vec<String> = overlay
                .quality_reasons
                .iter()
                .map(|r| r.to_string())
                .collect();
            out.push_str(&format!("    Quality Fail: {}\n", reasons.join(", ")));
        }
        out.push_str(RESET);
    }

    if !recent.is_empty() {
        out.push('\n');
        for line in recent {
            out.push_str(&format!("  {line}\n"));
        }
    }

    out.push_str("\nkeys: r arms enrollment | a name saves the capture | empty line cancels | q quits\n");
    out
}

/// One human-readable line per runtime event.
pub fn describe_event(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Pipeline(PipelineEvent::Welcome { track, name }) => {
            format!("welcome {name} (track {track})")
        }
        RuntimeEvent::Pipeline(PipelineEvent::TrackVerified {
            track,
            name,
            confidence,
        }) => {
            format!("track {track} verified as {name} ({confidence:.2})")
        }
        RuntimeEvent::Pipeline(PipelineEvent::TrackRejected { track, distance }) => {
            format!("track {track} not recognized (distance {distance:.2})")
        }
        RuntimeEvent::Pipeline(PipelineEvent::ChallengeIssued { track, kind }) => {
            format!("track {track}: challenge {kind}")
        }
        RuntimeEvent::Pipeline(PipelineEvent::ChallengeTimedOut { track, kind }) => {
            format!("track {track}: challenge {kind} timed out")
        }
        RuntimeEvent::EnrollReady { track } => {
            format!("track {track}: capture held, type a name to enroll")
        }
    }
}

/// Run the dashboard until `q` or Ctrl-C, then shut the pipeline down.
pub async fn run(mut runtime: PipelineRuntime) -> Result<()> {
    let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);
    let (note_tx, mut note_rx) = mpsc::channel::<String>(16);

    let signal_quit = quit_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_quit.send(()).await;
        }
    });

    let handle = runtime.handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "q" => {
                    let _ = quit_tx.send(()).await;
                    break;
                }
                "r" => {
                    if handle.arm_enroll().await.is_err() {
                        break;
                    }
                    let _ = note_tx
                        .send("enrollment armed: hold one face in view".to_string())
                        .await;
                }
                "" => {
                    let _ = handle.cancel_enroll().await;
                    let _ = note_tx.send("enrollment cancelled".to_string()).await;
                }
                name => {
                    let note = match handle.complete_enroll(name).await {
                        Ok(id) => format!("enrolled {name} ({id})"),
                        Err(e) => format!("enrollment failed: {e}"),
                    };
                    let _ = note_tx.send(note).await;
                }
            }
        }
    });

    let render = Arc::clone(&runtime.render);
    let mut recent: VecDeque<String> = VecDeque::new();
    let mut interval = tokio::time::interval(Duration::from_millis(200));

    loop {
        if quit_rx.try_recv().is_ok() {
            break;
        }
        interval.tick().await;

        while let Ok(event) = runtime.events.try_recv() {
            push_recent(&mut recent, describe_event(&event));
        }
        while let Ok(note) = note_rx.try_recv() {
            push_recent(&mut recent, note);
        }

        let frame = render.lock().unwrap().clone();
        let text = render_text(&frame, &recent);
        let mut stdout = std::io::stdout();
        stdout.write_all(text.as_bytes()).ok();
        stdout.flush().ok();
    }

    runtime.handle.shutdown().await;
    runtime.join();
    Ok(())
}

fn push_recent(recent: &mut VecDeque<String>, line: String) {
    if recent.len() == RECENT_EVENTS {
        recent.pop_front();
    }
    recent.push_back(line);
}
