//! A line based selection surface on stdin.
//!
//! - `list`: show every label and whether it is selected
//! - `+label` / `-label`: select / deselect a label
//! - `quit` or end of input: stop the matching loop

use std::io::BufRead;

use color_print::cprintln;
use tracing::warn;

use crate::{selection::Selection, stop::StopToken};

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    List,
    Select(&'a str),
    Deselect(&'a str),
    Quit,
    Help,
}

fn parse(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match line {
        "list" | "ls" => Command::List,
        "quit" | "exit" | "q" => Command::Quit,
        _ => {
            if let Some(label) = argument(line, '+') {
                Command::Select(label)
            } else if let Some(label) = argument(line, '-') {
                Command::Deselect(label)
            } else {
                Command::Help
            }
        }
    })
}

fn argument(line: &str, prefix: char) -> Option<&str> {
    line.strip_prefix(prefix)
        .map(str::trim)
        .filter(|label| !label.is_empty())
}

fn print_help() {
    cprintln!("<dim>commands: list | +label | -label | quit</>");
}

fn print_selection(selection: &Selection) {
    for category in selection.catalog().categories() {
        cprintln!("<strong>{}</strong>", category.name);
        for (label, _) in &category.entries {
            if selection.is_selected(label) {
                cprintln!("  <g>[x]</> {}", label);
            } else {
                cprintln!("  [ ] {}", label);
            }
        }
    }
}

/// Reads commands from `input` until `quit` or end of input, then cancels `stop`.
pub fn run_console(input: impl BufRead, selection: &mut Selection, stop: &StopToken) {
    print_help();
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to read input: {err}");
                break;
            }
        };
        let Some(command) = parse(&line) else {
            continue;
        };
        let res = match command {
            Command::List => {
                print_selection(selection);
                Ok(())
            }
            Command::Select(label) => selection.toggle(label, true),
            Command::Deselect(label) => selection.toggle(label, false),
            Command::Quit => break,
            Command::Help => {
                print_help();
                Ok(())
            }
        };
        if let Err(err) = res {
            cprintln!("<r>{}</>", err);
        }
    }
    stop.cancel();
}
