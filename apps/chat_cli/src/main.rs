use std::{collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chat_core::{
    config::{load_settings_from, SETTINGS_FILE},
    mention::render_plain,
    ChatClient, ChatError, ChatEvent, RenderedMessage, RoomSession,
};
use clap::Parser;
use shared::domain::{MessageId, RoomKey};
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    classroom: String,
    /// Lesson room inside the classroom; the classroom-wide room otherwise.
    #[arg(long)]
    lesson: Option<String>,
    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config);
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if args.token.is_some() {
        settings.auth_token = args.token;
    }

    let client = ChatClient::connect_with_settings(settings).await?;
    println!(
        "Signed in as {} ({:?})",
        client.profile().display_name,
        client.profile().role
    );

    let room = match args.lesson {
        Some(lesson) => RoomKey::lesson(args.classroom, lesson),
        None => RoomKey::classroom(args.classroom),
    };
    let session = client.open_room(room.clone()).await;
    println!("Joined room {room}. Type a message, /who, /delete <id> or /quit.");

    let printer = tokio::spawn(print_timeline(Arc::clone(&session)));
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/who", _) => {
                let directory = session.directory().read().await;
                for member in directory.members() {
                    println!("  {} <{}> {}", member.display_name, member.email, member.id);
                }
            }
            ("/delete", id) => delete_with_confirmation(&session, id.trim(), &mut lines).await?,
            ("", _) => {}
            (_, _) => {
                session.input(line, line.len()).await;
                if let Err(err) = session.send().await {
                    eprintln!("! {err}");
                }
            }
        }
    }

    printer.abort();
    client.close_room(&room).await;
    Ok(())
}

async fn delete_with_confirmation(
    session: &RoomSession,
    id: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    if id.is_empty() {
        eprintln!("! usage: /delete <message id>");
        return Ok(());
    }
    let pending = match session.request_delete(&MessageId::from(id)).await {
        Ok(pending) => pending,
        Err(err @ (ChatError::DeleteNotAuthorized(_) | ChatError::MessageNotFound(_))) => {
            eprintln!("! {err}");
            return Ok(());
        }
        Err(err) => bail!(err),
    };

    println!("Delete message {id}? This cannot be undone. [y/N]");
    let Some(answer) = lines.next_line().await? else {
        return Ok(());
    };
    if !answer.trim().eq_ignore_ascii_case("y") {
        println!("Kept message {id}.");
        return Ok(());
    }
    match session.confirm_delete(pending).await {
        Ok(_) => println!("Deleted message {id}."),
        Err(err) => eprintln!("! {err}"),
    }
    Ok(())
}

fn print_message(rendered: &RenderedMessage) {
    let id = rendered
        .message
        .persisted_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "sending".into());
    println!(
        "[{}] {}: {}  ({id})",
        rendered.message.created_at.format("%H:%M"),
        rendered.author_name,
        render_plain(&rendered.segments)
    );
}

async fn print_timeline(session: Arc<RoomSession>) {
    let mut events = session.subscribe_events();
    let mut printed = HashSet::new();
    print_new(&session, &mut printed).await;

    loop {
        match events.recv().await {
            Ok(ChatEvent::TimelineChanged) => print_new(&session, &mut printed).await,
            Ok(ChatEvent::Notice(notice)) => eprintln!("! {notice}"),
            Ok(ChatEvent::SuggestionsChanged) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "cli: timeline printer lagged");
                print_new(&session, &mut printed).await;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_new(session: &RoomSession, printed: &mut HashSet<MessageId>) {
    for rendered in session.rendered().await {
        let Some(id) = rendered.message.persisted_id.clone() else {
            continue;
        };
        if printed.insert(id) {
            print_message(&rendered);
        }
    }
}
