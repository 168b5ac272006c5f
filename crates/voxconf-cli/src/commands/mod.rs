//! Command implementations for the voxconf CLI
//!
//! Each command module handles the CLI interface and delegates to
//! voxconf-runtime for loading and storing configuration.

use std::io::{self, BufRead, Write};

use anyhow::Result;

pub mod autoconfigure;
pub mod get;
pub mod set;
pub mod show;

/// Prints `message` and reads one trimmed line from stdin.
///
/// End of input reads as an empty line.
pub fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Asks for a number in `0..=exit` until one is given; `exit` is also
/// returned at end of input.
pub fn prompt_choice(message: &str, exit: usize) -> Result<usize> {
    loop {
        let answer = prompt(&format!("{message} [0-{exit}]: "))?;
        if answer.is_empty() {
            return Ok(exit);
        }
        match answer.parse::<usize>() {
            Ok(choice) if choice <= exit => return Ok(choice),
            _ => println!("Please select one of the available options"),
        }
    }
}
