//! resonance-session - terminal front end for a Resonance session
//!
//! Reads `intent | tone` lines from stdin. `:clear` clears the shared
//! store, `:quit` exits. After every change the connection state,
//! presence count and the five most recent memories are printed.

use resonance_client::{PresenceLink, RemoteStore, SessionConfig, WsLiveFeed};
use resonance_core::{
    FeedController, FeedEvent, LocalStore, MemoryStore, SubmitOutcome, Subscription,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Session {
    controller: FeedController,
    feed: Subscription<FeedEvent>,
    presence: Option<PresenceLink>,
}

fn open_session(config: &SessionConfig) -> Session {
    if !config.is_local_only() {
        match open_remote(config) {
            Ok(session) => return session,
            Err(e) => tracing::warn!("Falling back to local-only: {}", e),
        }
    }
    let store = Arc::new(LocalStore::new());
    let feed = store.subscribe();
    let mut controller =
        FeedController::new(store as Arc<dyn MemoryStore>).with_timeout(config.timeout);
    controller.set_presence_count(1);
    Session {
        controller,
        feed,
        presence: None,
    }
}

fn open_remote(config: &SessionConfig) -> resonance_client::Result<Session> {
    let store: Arc<dyn MemoryStore> = Arc::new(RemoteStore::new(config)?);
    let feed = WsLiveFeed::subscribe(config)?;
    let presence = PresenceLink::spawn(config, PresenceLink::new_session_id())?;
    tracing::info!("Session {} joining {}", presence.session_id(), config.presence_topic);
    Ok(Session {
        controller: FeedController::new(store).with_timeout(config.timeout),
        feed,
        presence: Some(presence),
    })
}

/// Next presence count. Pending forever without a link; `None` once it ends.
async fn presence_changed(rx: &mut Option<watch::Receiver<usize>>) -> Option<usize> {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    match rx.changed().await {
        Ok(()) => Some(*rx.borrow_and_update()),
        Err(_) => None,
    }
}

fn render(controller: &FeedController) {
    println!();
    println!(
        "[{}] {} present",
        controller.state(),
        controller.presence_count()
    );
    if controller.view().is_empty() {
        println!("  (no memories yet)");
    }
    for entry in controller.view().entries() {
        println!("  {:>3}  {} | {} -> {}", entry.score, entry.x, entry.y, entry.z);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the view.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resonance_client=info,resonance_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SessionConfig::from_env();
    let Session {
        mut controller,
        mut feed,
        presence,
    } = open_session(&config);
    let mut presence_rx = presence.as_ref().map(PresenceLink::watch);

    controller.bootstrap().await;
    render(&controller);
    println!("Enter `intent | tone`, `:clear` or `:quit`.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    ":quit" => break,
                    ":clear" => {
                        if let Err(e) = controller.clear_all().await {
                            eprintln!("clear failed: {}", e);
                        }
                    }
                    "" => continue,
                    _ => {
                        let (intent, tone) = line.split_once('|').unwrap_or((line, ""));
                        match controller.submit(intent.trim(), tone.trim()).await {
                            SubmitOutcome::Ignored => continue,
                            SubmitOutcome::Stored(entry) => println!("> {}", entry.z),
                            SubmitOutcome::Local(entry) => println!("> {} (kept locally)", entry.z),
                        }
                    }
                }
                render(&controller);
            }
            event = feed.next() => {
                let Some(event) = event else { break };
                controller.handle(event).await;
                render(&controller);
            }
            count = presence_changed(&mut presence_rx) => {
                if let Some(count) = count {
                    controller.set_presence_count(count);
                    render(&controller);
                } else {
                    presence_rx = None;
                }
            }
        }
    }

    feed.unsubscribe();
    drop(presence);
    Ok(())
}
