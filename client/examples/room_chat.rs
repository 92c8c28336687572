use anyhow::Result;
use arena_client::{
    ArenaClient, ChannelHandler, ChannelOptions, ChatMessage, ClientConfig, ConnectionStatus,
    MessageKind, RoomId, RoomView, SendOutcome, SessionPhase,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

struct Printer;

impl ChannelHandler for Printer {
    fn on_status(&self, room: &RoomId, status: ConnectionStatus) {
        println!("[{}] connection {:?}", room, status);
    }

    fn on_history(&self, room: &RoomId, messages: &[ChatMessage]) {
        println!("[{}] {} earlier messages", room, messages.len());
        for message in messages {
            print_message(room, message);
        }
    }

    fn on_message(&self, room: &RoomId, message: &ChatMessage) {
        print_message(room, message);
    }
}

fn print_message(room: &RoomId, message: &ChatMessage) {
    match message.display_name() {
        Some(name) => println!("[{}] {}: {}", room, name, message.text),
        None => println!("[{}] *** {} ***", room, message.text),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /login <user>   - Sign in (password is read from the next line)");
    println!("  /logout         - Sign out");
    println!("  /forgot <email> - Request a password reset");
    println!("  /whoami         - Show the current session");
    println!("  /room <id>      - Switch to a room");
    println!("  /leave          - Close the current room");
    println!("  /reconnect      - Reopen the current room");
    println!("  /winner <text>  - Post a winner announcement");
    println!("  /quit           - Exit");
    println!("  <message>       - Send message to current room");
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Sent => {}
        SendOutcome::EmptyText => println!("Nothing to send"),
        SendOutcome::NotOpen => println!("Room is not connected"),
    }
}

async fn handle_input(
    line: &str,
    client: &ArenaClient,
    view: &mut RoomView,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<bool> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(true);
    }

    let Some(command) = line.strip_prefix('/') else {
        match view.current() {
            Some(channel) => report(channel.send(line)),
            None => println!("No room selected. Use /room <id> first."),
        }
        return Ok(true);
    };

    let (cmd, arg) = match command.split_once(' ') {
        Some((cmd, arg)) => (cmd, Some(arg.trim())),
        None => (command, None),
    };

    match cmd {
        "help" => print_help(),
        "login" => {
            let Some(username) = arg else {
                println!("Usage: /login <user>");
                return Ok(true);
            };
            println!("Password:");
            let password = lines.next_line().await?.unwrap_or_default();
            match client.session().sign_in(username, password.trim()).await {
                Ok(()) => {
                    println!("Signed in as {}", username);
                    view.refresh();
                }
                Err(e) => println!("Login failed: {}", e),
            }
        }
        "logout" => {
            client.session().logout();
            view.refresh();
            println!("Signed out");
        }
        "forgot" => match arg {
            Some(email) => match client.api().request_password_reset(email).await {
                Ok(ack) => println!("{}", ack.message),
                Err(e) => println!("Reset request failed: {}", e),
            },
            None => println!("Usage: /forgot <email>"),
        },
        "whoami" => {
            let state = client.session().state();
            match (state.phase(), state.user) {
                (SessionPhase::LoggedIn, Some(user)) => {
                    let role = if user.is_admin() { " (admin)" } else { "" };
                    println!("{} <{}>{}", user.username, user.email, role);
                }
                (phase, _) => println!("{:?}", phase),
            }
        }
        "room" => match arg {
            Some(room) => {
                let channel = view.show(room);
                println!("Switched to room: {}", channel.room_id());
            }
            None => println!("Usage: /room <id>"),
        },
        "leave" => view.hide(),
        "reconnect" => {
            if view.refresh().is_none() {
                println!("No room selected");
            }
        }
        "winner" => match (arg, view.current()) {
            (Some(text), Some(channel)) => report(channel.send_kind(text, MessageKind::Winner)),
            _ => println!("Usage: /winner <text> (in a room)"),
        },
        "quit" | "exit" => return Ok(false),
        _ => println!("Unknown command: /{}. Type /help for commands.", cmd),
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::from_env()?;
    println!("Arena room chat ({})", config.api_base_url);
    println!("=================");

    let client = ArenaClient::new(&config)?;
    client.session().bootstrap().await;

    match client.session().user() {
        Some(user) => println!("Welcome back, {}", user.username),
        None => println!("Not signed in. Use /login <user>."),
    }
    print_help();

    let options = ChannelOptions {
        reconnect: None,
        handler: Some(Arc::new(Printer)),
    };
    let mut view = client.room_view(options);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !handle_input(&line, &client, &mut view, &mut lines).await? {
            break;
        }
    }

    view.hide();
    Ok(())
}
