//! The short-lived control client: open the control socket, write one
//! command, wait for the correlated response, print it, exit.

pub mod client;

use anyhow::Result;

use corral_infra::config::Configuration;

/// Join argv back into a command line, quoting tokens with whitespace so
/// the daemon's splitter reassembles them.
pub fn assemble_command(args: &[String]) -> String {
    args.iter()
        .map(|token| {
            if token.contains(char::is_whitespace) && !token.starts_with(['{', '[']) {
                format!("\"{}\"", token.replace('"', "\\\""))
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Send a command and render the response. Returns the process exit code.
pub async fn run(args: Vec<String>, session: Option<u64>, wait: bool) -> Result<i32> {
    let config = Configuration::create()?;
    let command = assemble_command(&args);
    let response = client::send_command(&config, &command, session, wait).await?;

    if response.success {
        match serde_json::to_string_pretty(&response.data) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", response.data),
        }
        Ok(0)
    } else {
        eprintln!(
            "Error: {}",
            response.error.as_deref().unwrap_or("command failed")
        );
        Ok(1)
    }
}
