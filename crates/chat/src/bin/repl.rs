//! Line-oriented driver for the conversation controller.
//!
//! Wires the controller, verification host, and backend client together the
//! way an embedding view would, with a stand-in widget that issues tokens
//! without user interaction.

use std::env;
use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::Snafu;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use saga_api::{ApiClient, DEFAULT_BASE_URL};
use saga_chat::{
    ChatController, Role, SendRejection, VerificationEvent, VerificationHost, VerificationToken,
    VerificationWidget, WidgetId,
};
use saga_prefs::PrefsStore;

#[derive(Debug, Clone)]
struct ReplArgs {
    base_url: String,
    sitekey: String,
}

#[derive(Debug, Snafu)]
enum ReplError {
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue { stage: &'static str, arg: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("verification widget failed to mount"))]
    WidgetUnavailable { stage: &'static str },
}

type ReplResult<T> = Result<T, ReplError>;

/// Stand-in verification widget for terminal sessions.
///
/// Issues a fresh token on render and on every reset, mimicking a user who
/// completes the check immediately each time.
struct AutoVerifier {
    issued: AtomicU64,
    events: std::sync::Mutex<Option<mpsc::UnboundedSender<VerificationEvent>>>,
}

impl AutoVerifier {
    fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            events: std::sync::Mutex::new(None),
        }
    }

    fn issue(&self, events: &mpsc::UnboundedSender<VerificationEvent>) {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        let token = VerificationToken::new(format!("auto-{serial}"));
        let _ = events.send(VerificationEvent::Issued(token));
    }
}

impl VerificationWidget for AutoVerifier {
    fn render(
        &self,
        _sitekey: &str,
        events: mpsc::UnboundedSender<VerificationEvent>,
    ) -> Option<WidgetId> {
        self.issue(&events);
        *self.events.lock().expect("verifier events lock poisoned") = Some(events);
        Some(WidgetId("auto-verifier".to_string()))
    }

    fn reset(&self, _widget: &WidgetId) {
        let events = self.events.lock().expect("verifier events lock poisoned");
        if let Some(events) = events.as_ref() {
            self.issue(events);
        }
    }

    fn remove(&self, _widget: &WidgetId) {
        self.events
            .lock()
            .expect("verifier events lock poisoned")
            .take();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        eprintln!("repl_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> ReplResult<()> {
    let args = parse_args(env::args().skip(1))?;

    let preferences = PrefsStore::load();
    let snapshot = preferences.snapshot();
    tracing::info!(
        theme = ?snapshot.theme,
        text_px = snapshot.text_size.font_px(),
        "loaded presentation preferences"
    );

    let client = ApiClient::new(&args.base_url);
    match client.health().await {
        Ok(health) => {
            tracing::info!(status = %health.status, environment = %health.environment, "backend is up");
        }
        Err(error) => {
            tracing::warn!(status = error.status(), error = %error, "backend health check failed");
        }
    }

    let mut host = VerificationHost::new(Arc::new(AutoVerifier::new()), &args.sitekey);
    if !host.mount().await {
        return WidgetUnavailableSnafu { stage: "mount-widget" }.fail();
    }

    let mut controller = ChatController::new(Arc::new(client));

    println!("saga repl: type a question, or /clear, /retry, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        drain_widget_events(&mut host, &mut controller);

        print!("> ");
        flush_stdout();

        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };

        match line.trim() {
            "/quit" => break,
            "/clear" => {
                controller.clear_messages();
                println!("(conversation cleared)");
            }
            "/retry" => {
                drain_widget_events(&mut host, &mut controller);
                match controller.retry_last_message() {
                    Ok(()) => {
                        if controller.is_loading() {
                            host.reset();
                            pump_exchange(&mut controller).await;
                        } else {
                            println!("(nothing to retry)");
                        }
                    }
                    Err(rejection) => report_rejection(rejection),
                }
            }
            "" => {}
            text => match controller.send_message(text) {
                Ok(()) => {
                    host.reset();
                    pump_exchange(&mut controller).await;
                }
                Err(rejection) => report_rejection(rejection),
            },
        }
    }

    host.unmount();
    Ok(())
}

/// Forwards pending widget events into the controller's gate.
fn drain_widget_events(host: &mut VerificationHost, controller: &mut ChatController) {
    while let Some(event) = host.try_event() {
        controller.apply_verification(event);
    }
}

/// Drives one exchange to completion, printing the reveal as it grows.
async fn pump_exchange(controller: &mut ChatController) {
    let mut printed = 0usize;

    while controller.is_loading() {
        let Some(_change) = controller.next_change().await else {
            break;
        };
        printed = print_tail_delta(controller, printed);
    }

    print_tail_delta(controller, printed);
    println!();
}

/// Prints any assistant tail content beyond what was already shown.
fn print_tail_delta(controller: &ChatController, printed: usize) -> usize {
    let Some(message) = controller.messages().last() else {
        return printed;
    };
    if message.role != Role::Assistant {
        return printed;
    }

    let total = message.content.chars().count();
    // The tail can be swapped wholesale when a failed placeholder becomes an
    // error notice; restart printing in that case.
    let from = if total < printed { 0 } else { printed };

    let delta: String = message.content.chars().skip(from).collect();
    if !delta.is_empty() {
        print!("{delta}");
        flush_stdout();
    }
    total
}

fn report_rejection(rejection: SendRejection) {
    match rejection {
        SendRejection::EmptyInput => println!("(nothing to send)"),
        SendRejection::Busy => println!("(a message is already in flight)"),
        SendRejection::VerificationRequired(notice) => println!("({})", notice.message()),
    }
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}

fn parse_args(mut raw_args: impl Iterator<Item = String>) -> ReplResult<ReplArgs> {
    let mut base_url = env::var("SAGA_API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let mut sitekey = "local-dev".to_string();

    while let Some(arg) = raw_args.next() {
        match arg.as_str() {
            "--base-url" => {
                base_url = raw_args.next().ok_or_else(|| {
                    MissingArgumentValueSnafu {
                        stage: "parse-args",
                        arg: "--base-url".to_string(),
                    }
                    .build()
                })?;
            }
            "--sitekey" => {
                sitekey = raw_args.next().ok_or_else(|| {
                    MissingArgumentValueSnafu {
                        stage: "parse-args",
                        arg: "--sitekey".to_string(),
                    }
                    .build()
                })?;
            }
            raw => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: raw.to_string(),
                }
                .fail();
            }
        }
    }

    Ok(ReplArgs { base_url, sitekey })
}
