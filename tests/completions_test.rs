//! Tests for shell completion output.

use anyhow::Result;
use clap::Parser;
use clap_complete::Shell;
use vcprovision::cli::Cli;

#[test]
fn test_completions_flag_parsing() -> Result<()> {
    let shells = [
        ("bash", Shell::Bash),
        ("zsh", Shell::Zsh),
        ("fish", Shell::Fish),
        ("powershell", Shell::PowerShell),
        ("elvish", Shell::Elvish),
    ];

    for (shell_str, expected_shell) in shells {
        let args = Cli::try_parse_from(["vcprovision", "--completions", shell_str])?;
        assert_eq!(args.completions, Some(expected_shell), "Mismatched shell for '{}'", shell_str);
    }

    Ok(())
}

#[test]
fn test_completions_generation() -> Result<()> {
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
        let mut buf = Vec::new();
        vcprovision::write_completions(shell, &mut buf);
        let output = String::from_utf8(buf)?;

        assert!(!output.is_empty(), "{} completions should not be empty", shell);
        assert!(output.contains("vcprovision"), "{} completions should name the binary", shell);
    }

    Ok(())
}

#[test]
fn test_bash_completions_list_flags() -> Result<()> {
    let mut buf = Vec::new();
    vcprovision::write_completions(Shell::Bash, &mut buf);
    let output = String::from_utf8(buf)?;

    for flag in ["--url", "--iso", "--persistent-size", "--hostname", "--profile"] {
        assert!(output.contains(flag), "bash completions should contain {}", flag);
    }

    Ok(())
}

#[test]
fn test_invalid_shell_is_rejected() {
    assert!(Cli::try_parse_from(["vcprovision", "--completions", "tcsh"]).is_err());
}
