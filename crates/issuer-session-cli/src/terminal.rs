/*
[INPUT]:  Link URLs from the orchestrator, terminal input
[OUTPUT]: Popup host that hands the link URL to the user's browser
[POS]:    Terminal surface - stands in for the browser window
[UPDATE]: When the link flow needs more from the host environment
*/

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use console::style;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use issuer_session_adapter::link::{
    Confirmation, CrossOriginError, PopupFeatures, PopupHost, PopupWindow, ScreenGeometry,
};
use tracing::debug;
use url::Url;

/// The provider page runs in the user's own browser, so its state is never readable.
/// It counts as closed once the user says so.
#[derive(Debug, Default)]
pub struct TerminalPopup {
    closed: AtomicBool,
}

impl TerminalPopup {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user reported they are done in the browser
    pub fn dismiss(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PopupWindow for TerminalPopup {
    fn is_closed(&self) -> Result<bool, CrossOriginError> {
        if self.closed.load(Ordering::SeqCst) {
            Ok(true)
        } else {
            Err(CrossOriginError)
        }
    }

    fn location(&self) -> Result<Option<String>, CrossOriginError> {
        Err(CrossOriginError)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Prints the link URL instead of opening a window
#[derive(Debug)]
pub struct TerminalPopupHost {
    /// Treat a line on stdin as the user closing the browser tab
    watch_stdin: bool,
    last_url: Mutex<Option<Url>>,
}

impl TerminalPopupHost {
    pub fn new(watch_stdin: bool) -> Self {
        Self {
            watch_stdin,
            last_url: Mutex::new(None),
        }
    }

    /// URL of the most recent link attempt
    pub fn last_url(&self) -> Option<Url> {
        self.last_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PopupHost for TerminalPopupHost {
    fn screen(&self) -> ScreenGeometry {
        ScreenGeometry::default()
    }

    fn open(&self, url: &Url, name: &str, _features: &PopupFeatures) -> Option<Arc<dyn PopupWindow>> {
        debug!(window = name, "handing link url to the terminal");
        *self.last_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.clone());

        eprintln!("{}", style("Open this URL in your browser to continue:").bold());
        eprintln!("  {}", style(url.as_str()).cyan().underlined());

        let popup = Arc::new(TerminalPopup::new());
        if self.watch_stdin {
            eprintln!("{}", style("Press Enter once you have finished in the browser.").dim());
            let handle = popup.clone();
            // plain thread: a blocked stdin read must not hold up runtime shutdown
            std::thread::spawn(move || {
                let mut line = String::new();
                if std::io::stdin().lock().read_line(&mut line).is_ok() {
                    handle.dismiss();
                }
            });
        }
        Some(popup)
    }
}

/// Confirmation prompt on the terminal; `assume_yes` skips it
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirmation {
    pub assume_yes: bool,
}

impl Confirmation for TerminalConfirmation {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_popup_is_unreadable_until_dismissed() {
        let popup = TerminalPopup::new();
        assert_eq!(popup.is_closed(), Err(CrossOriginError));
        assert_eq!(popup.location(), Err(CrossOriginError));

        popup.dismiss();
        assert_eq!(popup.is_closed(), Ok(true));
    }

    #[test]
    fn test_host_records_last_url() {
        let host = TerminalPopupHost::new(false);
        let url = Url::parse("https://api.test/issuer/me/link/twitter?state=s1").unwrap();
        let popup = host
            .open(&url, "link_twitter", &PopupFeatures::centered(&host.screen(), 600, 700))
            .expect("terminal host never blocks");
        assert!(popup.is_closed().is_err());
        assert_eq!(host.last_url(), Some(url));
    }

    #[test]
    fn test_assume_yes_skips_prompt() {
        let confirmation = TerminalConfirmation { assume_yes: true };
        assert!(confirmation.confirm("Disconnect your twitter account?"));
    }
}
