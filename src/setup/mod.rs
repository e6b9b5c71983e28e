//! Interactive first-run assistant: collects credentials, writes them to
//! `.env`, and installs native iOS dependencies where possible.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::Result;

pub const INVALID_INPUT: &str = "Invalid input. Please try again.";

pub struct CredentialPrompt {
    /// Environment variable the answer is written to.
    pub key: &'static str,
    pub question: &'static str,
    pub validate: fn(&str) -> bool,
}

fn valid_backend_url(value: &str) -> bool {
    value.starts_with("https://") && value.contains("supabase.co")
}

fn valid_anon_key(value: &str) -> bool {
    value.len() > 50
}

fn valid_api_key(value: &str) -> bool {
    value.starts_with("sk-")
}

pub const PROMPTS: [CredentialPrompt; 3] = [
    CredentialPrompt {
        key: "CHATMATE_BACKEND__URL",
        question: "Enter your Supabase URL (https://your-project.supabase.co): ",
        validate: valid_backend_url,
    },
    CredentialPrompt {
        key: "CHATMATE_BACKEND__ANON_KEY",
        question: "Enter your Supabase anon key: ",
        validate: valid_anon_key,
    },
    CredentialPrompt {
        key: "CHATMATE_COMPLETION__API_KEY",
        question: "Enter your completion API key (sk-...): ",
        validate: valid_api_key,
    },
];

/// Asks until the answer passes the prompt's check.
pub fn ask<R: BufRead, W: Write>(
    prompt: &CredentialPrompt,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    loop {
        write!(output, "{}", prompt.question)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(AppError::ConfigError(format!(
                "input closed before {} was provided",
                prompt.key
            )));
        }

        let answer = line.trim();
        if (prompt.validate)(answer) {
            debug!("Accepted value for {}", prompt.key);
            return Ok(answer.to_string());
        }
        writeln!(output, "{}", INVALID_INPUT)?;
    }
}

pub fn collect_answers<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<Vec<(&'static str, String)>> {
    PROMPTS
        .iter()
        .map(|prompt| ask(prompt, input, output).map(|answer| (prompt.key, answer)))
        .collect()
}

/// Replaces `KEY=` lines that already exist and appends the rest. Every
/// other line is kept as is.
pub fn merge_env(existing: &str, answers: &[(&str, String)]) -> String {
    let mut written = vec![false; answers.len()];
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let key = line.split('=').next().unwrap_or("").trim();
            match answers.iter().position(|(k, _)| *k == key) {
                Some(i) if !line.trim_start().starts_with('#') => {
                    written[i] = true;
                    format!("{}={}", answers[i].0, answers[i].1)
                }
                _ => line.to_string(),
            }
        })
        .collect();

    for (i, (key, value)) in answers.iter().enumerate() {
        if !written[i] {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut merged = lines.join("\n");
    merged.push('\n');
    merged
}

pub fn write_env(path: &Path, answers: &[(&str, String)]) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    fs::write(path, merge_env(&existing, answers))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeDeps {
    Installed,
    InstallFailed,
    MissingCocoaPods,
    NotMacOs,
}

impl NativeDeps {
    pub fn message(&self) -> &'static str {
        match self {
            NativeDeps::Installed => "iOS dependencies installed successfully!",
            NativeDeps::InstallFailed => {
                "iOS pod install failed. You can run it manually later: cd ios && pod install"
            }
            NativeDeps::MissingCocoaPods => {
                "CocoaPods not found. Install it for iOS development: sudo gem install cocoapods"
            }
            NativeDeps::NotMacOs => {
                "iOS development requires macOS. You can develop for Android on this platform."
            }
        }
    }
}

fn has_cocoapods() -> bool {
    Command::new("pod")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn install_native_deps(ios_dir: &Path) -> NativeDeps {
    if !cfg!(target_os = "macos") {
        return NativeDeps::NotMacOs;
    }
    if !has_cocoapods() {
        return NativeDeps::MissingCocoaPods;
    }

    match Command::new("pod").arg("install").current_dir(ios_dir).status() {
        Ok(status) if status.success() => NativeDeps::Installed,
        Ok(status) => {
            warn!("pod install exited with {}", status);
            NativeDeps::InstallFailed
        }
        Err(e) => {
            warn!("Could not run pod install: {}", e);
            NativeDeps::InstallFailed
        }
    }
}

pub fn next_steps(on_macos: bool) -> Vec<&'static str> {
    let mut steps = vec![
        "Set up your Supabase database by running the SQL in supabase-schema.sql",
        "Configure permissions in android/app/src/main/AndroidManifest.xml",
    ];
    if on_macos {
        steps.push("Configure permissions in ios/ChatMate/Info.plist");
        steps.push("Run: npm run android or npm run ios");
    } else {
        steps.push("Run: npm run android (iOS requires macOS)");
    }
    steps
}
