//! Trust prompts answered on the terminal.

use std::io::{self, BufRead, Write};

use netlaunch_core::descriptor::JnlpDescriptor;
use netlaunch_core::security::{PromptKind, TrustPrompter};
use netlaunch_core::verify::VerifierResult;

/// Asks on stderr and reads the answer from stdin. Anything but `y`/`yes`
/// counts as no.
pub struct StdinPrompter;

impl TrustPrompter for StdinPrompter {
    fn confirm(&self, kind: PromptKind, desc: &JnlpDescriptor, result: &VerifierResult) -> bool {
        let publisher = result
            .signer
            .as_ref()
            .and_then(|p| p.signer())
            .map(|c| c.subject.clone())
            .unwrap_or_else(|| "an unknown publisher".to_string());
        let app = desc.unique_key();
        let question = match kind {
            PromptKind::Unverified => format!(
                "{} is signed by {}, whose certificate is not trusted. Grant it full access?",
                app, publisher
            ),
            PromptKind::Verified => format!("{} is signed by {}. Grant it full access?", app, publisher),
            PromptKind::SigningError => {
                let issues: Vec<String> = result.issues.iter().map(ToString::to_string).collect();
                format!(
                    "{} is signed by {}, but: {}. Grant it full access anyway?",
                    app,
                    publisher,
                    issues.join("; ")
                )
            }
        };
        ask(&question)
    }

    fn confirm_mixed_signing(&self, desc: &JnlpDescriptor) -> bool {
        ask(&format!(
            "{} mixes signed and unsigned code. Unsigned parts stay sandboxed. Continue?",
            desc.unique_key()
        ))
    }
}

fn ask(question: &str) -> bool {
    eprint!("{} [y/N] ", question);
    let _ = io::stderr().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => is_yes(&line),
        Err(_) => false,
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
