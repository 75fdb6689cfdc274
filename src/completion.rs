//! # Shell Completion Module
//!
//! ```bash
//! playwise completion bash > ~/.local/share/bash-completion/completions/playwise
//! playwise completion zsh > ~/.config/zsh/completions/_playwise
//! ```

use crate::cli::{Args, Shell};
use clap::{Command, CommandFactory};
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

/// Write the completion script for `gen` to `out`.
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Print the completion script for `shell` on stdout.
pub fn print_completions(shell: Shell) {
    let mut cmd = Args::command();
    generate_completions(shell_to_completion_shell(shell), &mut cmd, &mut io::stdout());
}

pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}
