//! Per-browser sidebar state stored in the tower-sessions session.

use chrono::{NaiveDate, Utc};
use tower_sessions::Session;

use crate::domain::session::SessionState;
use crate::domain::ticker::TickerRecord;

use super::{AppState, WebError};

const SESSION_KEY: &str = "stockport.selection";

/// Loads the selection (or starts a new one), normalizes it against the
/// ticker list and writes it back when normalization changed it.
pub async fn load_selection(
    state: &AppState,
    session: &Session,
    tickers: &[TickerRecord],
) -> Result<SessionState, WebError> {
    let stored = session.get::<SessionState>(SESSION_KEY).await?;
    let fresh = stored.is_none();
    let mut selection =
        stored.unwrap_or_else(|| SessionState::new(&state.settings.session_defaults, today()));
    if selection.normalize(tickers, &state.settings.portfolios) || fresh {
        session.insert(SESSION_KEY, &selection).await?;
    }
    Ok(selection)
}

pub async fn save_selection(session: &Session, selection: &SessionState) -> Result<(), WebError> {
    session.insert(SESSION_KEY, selection).await?;
    Ok(())
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
