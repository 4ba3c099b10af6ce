use std::fmt::Write;

use softhouse_session::ChatView;
use softhouse_types::{Message, Role};

pub const TITLE: &str = "AI Software House";

/// Render the whole screen for `view`. Pure; the caller decides where it goes.
pub fn render(view: &ChatView) -> String {
    if view.loading {
        return "Loading...\n".to_string();
    }

    let Some(user) = &view.user else {
        return format!("{}\n\nYou are signed out. Type /login to sign in with Google.\n", TITLE);
    };

    let mut out = String::new();
    let status = if view.connection.is_connected() {
        "● Connected"
    } else {
        "○ Disconnected"
    };
    let _ = writeln!(out, "{} | {} | {} | /logout", TITLE, status, user.email);
    let _ = writeln!(out, "{}", "-".repeat(60));

    if view.messages.is_empty() {
        let _ = writeln!(out, "Welcome to {}", TITLE);
        let _ = writeln!(out, "Send a message to start chatting");
    } else {
        for message in &view.messages {
            out.push_str(&render_message(message));
        }
    }

    out
}

fn render_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let time = message.created_at.with_timezone(&chrono::Local).format("%H:%M");

    let mut out = String::new();
    let mut lines = message.content.lines();
    let first = lines.next().unwrap_or_default();
    let _ = writeln!(out, "[{}] {:>9}: {}", time, who, first);
    for line in lines {
        let _ = writeln!(out, "{:>19}{}", "", line);
    }
    out
}
