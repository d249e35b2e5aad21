use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

/// Print a completion script for clvm
#[derive(Debug, Clone, Args)]
pub struct CompletionsCommand {
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub fn execute(self) {
        print!("{}", render(self.shell));
    }
}

/// Completion script for `shell`, covering every subcommand and target
pub fn render(shell: Shell) -> String {
    let mut command = Cli::command();
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut command, "clvm", &mut script);
    String::from_utf8_lossy(&script).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBCOMMANDS: [&str; 6] = [
        "credentials",
        "clear",
        "tunnel",
        "proxy",
        "ssh",
        "completions",
    ];
    const TARGETS: [&str; 4] = ["aws", "gcp", "azure", "ssh"];

    #[test]
    fn test_each_shell_gets_its_own_dialect() {
        let cases = [
            (Shell::Bash, "complete -F _clvm"),
            (Shell::Zsh, "#compdef clvm"),
            (Shell::Fish, "complete -c clvm"),
            (Shell::PowerShell, "Register-ArgumentCompleter"),
            (Shell::Elvish, "edit:completion:arg-completer[clvm]"),
        ];

        for (shell, marker) in cases {
            let script = render(shell);
            assert!(script.contains(marker), "{shell} script lacks {marker:?}");
        }
    }

    #[test]
    fn test_subcommands_and_targets_are_offered() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let script = render(shell);
            for word in SUBCOMMANDS.iter().chain(TARGETS.iter()) {
                assert!(script.contains(word), "{shell} script lacks {word}");
            }
        }
    }

    #[test]
    fn test_tunnel_and_session_flags_are_offered() {
        let script = render(Shell::Zsh);

        let flags = [
            "--profile",
            "--port-start",
            "--port-end",
            "--ready-timeout",
            "--login",
            "--remote-port",
        ];
        for flag in flags {
            assert!(script.contains(flag), "zsh script lacks {flag}");
        }
    }
}
