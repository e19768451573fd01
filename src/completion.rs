//! # Shell Completion Module
//!
//! - Static completion scripts for every shell clap_complete supports
//! - An enhanced bash script that also completes stored user ids for
//!   `show`, `similar` and `playlist`
//!
//! ```bash
//! genre-distro completion zsh > ~/.config/zsh/completions/_genre-distro
//! genre-distro completion-enhanced > ~/.local/share/bash-completion/completions/genre-distro
//! ```

use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;
use std::path::Path;

use crate::db::{ProfileStore, SqliteStore};

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Stored user ids, sorted. Empty when there is no database yet.
pub fn get_user_completions(db_path: &Path) -> Result<Vec<String>> {
    if !db_path.exists() {
        return Ok(Vec::new());
    }
    match SqliteStore::open(db_path).and_then(|store| store.all_profiles()) {
        Ok(profiles) => Ok(profiles.into_iter().map(|p| p.user_id).collect()),
        Err(_) => Ok(Vec::new()),
    }
}

pub fn print_user_completions(db_path: &Path) -> Result<()> {
    for user_id in get_user_completions(db_path)? {
        println!("{user_id}");
    }
    Ok(())
}

/// Bash completion script with dynamic user id completion
pub fn generate_enhanced_bash_completion() {
    println!(r#"#!/bin/bash
# Install with: genre-distro completion-enhanced > ~/.local/share/bash-completion/completions/genre-distro

_genre_distro_users() {{
    if command -v genre-distro >/dev/null 2>&1; then
        genre-distro complete-users 2>/dev/null
    fi
}}

_genre_distro() {{
    local cur prev words cword
    _init_completion || return

    case "${{prev}}" in
        show|similar|playlist)
            mapfile -t COMPREPLY < <(_genre_distro_users | grep "^${{cur}}")
            return 0
            ;;
        completion)
            COMPREPLY=($(compgen -W "bash zsh fish power-shell elvish" -- "${{cur}}"))
            return 0
            ;;
        --space)
            COMPREPLY=($(compgen -W "super sub" -- "${{cur}}"))
            return 0
            ;;
        --time-range)
            COMPREPLY=($(compgen -W "short_term medium_term long_term" -- "${{cur}}"))
            return 0
            ;;
        distro|chunk|--taxonomy|--artists)
            _filedir json
            return 0
            ;;
        upload|--out|--data-dir)
            _filedir -d
            return 0
            ;;
    esac

    local subcommands="distro show fit sweep assign similar playlist chunk upload completion completion-enhanced help"

    if [[ $cword -eq 1 ]]; then
        COMPREPLY=($(compgen -W "$subcommands --help --version" -- "${{cur}}"))
    else
        case "${{words[1]}}" in
            distro)
                COMPREPLY=($(compgen -W "--user-id --num-tracks --time-range --json --save --help" -- "${{cur}}"))
                ;;
            fit)
                COMPREPLY=($(compgen -W "--k --seed --n-init --space --assign --help" -- "${{cur}}"))
                ;;
            sweep)
                COMPREPLY=($(compgen -W "--min-k --max-k --seed --n-init --space --help" -- "${{cur}}"))
                ;;
            assign)
                COMPREPLY=($(compgen -W "--archetypes --help" -- "${{cur}}"))
                ;;
            similar)
                COMPREPLY=($(compgen -W "-n --archetypes --help" -- "${{cur}}"))
                ;;
            playlist)
                COMPREPLY=($(compgen -W "--total --clusters --users-per-cluster --seed --archetypes --json --help" -- "${{cur}}"))
                ;;
            chunk)
                COMPREPLY=($(compgen -W "--playlist-id --chunk-size --chunks --name --seed --out --help" -- "${{cur}}"))
                ;;
            upload)
                COMPREPLY=($(compgen -W "--max-users --help" -- "${{cur}}"))
                ;;
            *)
                COMPREPLY=($(compgen -W "$subcommands" -- "${{cur}}"))
                ;;
        esac
    fi
}} &&
complete -F _genre_distro genre-distro

# ex: filetype=sh
"#);
}
