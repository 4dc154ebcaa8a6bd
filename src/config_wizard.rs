use crate::config::{config_file_path, FileConfig};
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Parses a yes/no answer; anything other than an explicit no keeps verification on.
fn parse_verify_answer(answer: &str) -> bool {
    !matches!(
        answer.trim().to_lowercase().as_str(),
        "n" | "no" | "false"
    )
}

fn prompt_line(label: &str, input: &mut impl BufRead) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub fn run() -> Result<()> {
    println!("Welcome to the vibesearch configuration wizard!");
    println!("Values left empty fall back to CRIBL_API_URL / CRIBL_AUTH_TOKEN at runtime.");
    println!();

    let stdin = io::stdin();
    let mut input = stdin.lock();

    let api_url = prompt_line("Enter API URL (e.g. https://host/api/v1): ", &mut input)?;

    print!("Enter auth token (hidden): ");
    io::stdout().flush()?;
    let token = rpassword::read_password()?.trim().to_string();

    let verify_ssl = parse_verify_answer(&prompt_line("Verify SSL? [Y/n]: ", &mut input)?);

    println!();
    println!("Saving configuration...");

    let config_path = config_file_path().context("Could not determine configuration directory.")?;
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    // Keep polling settings a user may have added by hand
    let mut file_config = FileConfig::read_or_default(&config_path)?;
    file_config.api_url = (!api_url.is_empty()).then_some(api_url);
    file_config.auth_token = (!token.is_empty()).then_some(token);
    file_config.verify_ssl = Some(verify_ssl);

    let toml_string = toml::to_string(&file_config)?;
    std::fs::write(&config_path, toml_string)
        .context(format!("Failed to write {:?}", config_path))?;
    println!("Configuration saved to: {}", config_path.display());
    println!();
    println!("You can now run 'vibesearch' from any directory.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_defaults_to_yes() {
        assert!(parse_verify_answer(""));
        assert!(parse_verify_answer("Y"));
        assert!(parse_verify_answer("whatever"));
        assert!(!parse_verify_answer("n"));
        assert!(!parse_verify_answer(" No \n"));
        assert!(!parse_verify_answer("false"));
    }

    #[test]
    fn prompt_line_trims_input() {
        let mut input = io::Cursor::new("  https://host/api/v1  \n");
        assert_eq!(
            prompt_line("url: ", &mut input).unwrap(),
            "https://host/api/v1"
        );
    }
}
