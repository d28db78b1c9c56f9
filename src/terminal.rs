//! Terminal chat: one-shot prompts and the interactive loop.

use std::io::{self, Write};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::router::{RoutedResponse, ToolRouter};

const EXIT_COMMANDS: [&str; 4] = ["/q", "/quit", "exit", "quit"];

pub fn is_exit(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|cmd| line.eq_ignore_ascii_case(cmd))
}

/// Answer a single prompt and return.
pub async fn one_shot(router: &ToolRouter, prompt: &str) -> Result<()> {
    // ---
    answer(router, prompt).await
}

/// Read lines from stdin until an exit command or EOF.
pub async fn repl(router: &ToolRouter) -> Result<()> {
    // ---
    println!("Connected. Type a message, `list sensors`, `!sensor sensor_id=...` (or /quit).\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            println!("bye!");
            break;
        }
        answer(router, line).await?;
    }
    Ok(())
}

async fn answer(router: &ToolRouter, input: &str) -> Result<()> {
    // ---
    print!("assistant> ");
    io::stdout().flush()?;

    let mut streamed = false;
    let routed = router
        .route_streaming(input, &mut |token: &str| {
            streamed = true;
            print!("{token}");
            let _ = io::stdout().flush();
        })
        .await;

    match routed {
        RoutedResponse::ChatResult(_) if streamed => println!(),
        other => println!("{}", other.text()),
    }
    println!();
    Ok(())
}
