use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, IsTerminal};
use std::path::Path;
use zeroize::Zeroizing;

/// Keystore password, from the first source that yields one.
///
/// `explicit` carries `--password` or `SIGNERGEN_PASSWORD`.
pub fn read_password(explicit: Option<String>) -> Result<Zeroizing<String>> {
    if let Some(pw) = explicit {
        let pw = Zeroizing::new(pw);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    //  stdin (pipeline)
    //  printf "%s" "$PW" | signergen keystores
    if !io::stdin().is_terminal() {
        let mut pw = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut pw)?;
        trim_newline(&mut pw);

        if !pw.is_empty() {
            return Ok(pw);
        }
        bail!("No password provided");
    }

    read_new_password_with_confirmation()
}

fn read_new_password_with_confirmation() -> Result<Zeroizing<String>> {
    let pw1 = Zeroizing::new(rpassword::prompt_password("Password: ")?);
    let pw2 = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

/// Secret store token. A token file wins over `--token` and
/// `SIGNERGEN_VAULT_TOKEN`.
pub fn read_token(explicit: Option<String>, file: Option<&Path>) -> Result<Zeroizing<String>> {
    let mut token = match (file, explicit) {
        (Some(path), _) => Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read token file {}", path.display()))?,
        ),
        (None, Some(token)) => Zeroizing::new(token),
        (None, None) => {
            bail!("a secret store token is required (--token, --token-file or SIGNERGEN_VAULT_TOKEN)")
        }
    };

    trim_newline(&mut token);
    if token.trim().is_empty() {
        bail!("secret store token is empty");
    }
    Ok(token)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
