mod config;
mod input;
mod view;

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use softhouse_auth::{AuthProvider, GoTrueAuth, MemoryAuth, SessionGate};
use softhouse_session::{ChatClient, WsConnector, chat_endpoint};
use softhouse_types::User;

use config::Config;
use input::Input;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they stay out of the rendered chat
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "softhouse=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let endpoint = chat_endpoint(&config.chat_url)?;

    // Auth: Supabase when configured, otherwise an offline demo identity
    let (provider, gotrue): (Arc<dyn AuthProvider>, Option<Arc<GoTrueAuth>>) =
        match &config.supabase {
            Some(supabase) => {
                let auth = Arc::new(
                    GoTrueAuth::new(supabase.url.clone(), supabase.anon_key.clone()).on_redirect(
                        |url| {
                            println!("Open this URL to sign in:\n  {}", url);
                            println!("Then paste the access token with /token <token>");
                        },
                    ),
                );
                if let Some(token) = &config.access_token {
                    if let Err(e) = auth.complete_sign_in(token).await {
                        warn!("Stored access token rejected: {}", e);
                    }
                }
                (auth.clone() as Arc<dyn AuthProvider>, Some(auth))
            }
            None => {
                info!("No Supabase project configured, /login signs in as a demo user");
                let demo = MemoryAuth::new().signing_in_as(User::new("demo", "demo@localhost"));
                (Arc::new(demo) as Arc<dyn AuthProvider>, None)
            }
        };

    let gate = SessionGate::start(provider, config.redirect_url.clone());
    let client = ChatClient::spawn(gate, endpoint, Arc::new(WsConnector));

    // Re-render whenever the view changes
    let mut views = client.watch();
    let renderer = tokio::spawn(async move {
        loop {
            let screen = view::render(&views.borrow_and_update());
            print!("{}{}", CLEAR_SCREEN, screen);
            let _ = std::io::stdout().flush();
            if views.changed().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match input::parse(&line) {
            Input::Send(content) => client.send(content),
            Input::Blank => {}
            Input::Login => {
                if let Err(e) = client.sign_in().await {
                    warn!("Sign-in failed: {}", e);
                }
            }
            Input::Token(token) => match &gotrue {
                Some(auth) => {
                    if let Err(e) = auth.complete_sign_in(&token).await {
                        warn!("Access token rejected: {}", e);
                    }
                }
                None => println!("/token needs SOFTHOUSE_SUPABASE_URL to be set"),
            },
            Input::Logout => client.sign_out().await,
            Input::Help => println!("{}", input::HELP),
            Input::Quit => break,
        }
    }

    client.shutdown().await;
    renderer.abort();
    info!("Bye");

    Ok(())
}
