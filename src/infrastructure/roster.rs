use crate::domain::directive::Directive;
use crate::domain::payment::IncomingPayment;
use crate::domain::policy::Recipient;
use crate::domain::ports::{Participant, RecipientResolver, Roster, RosterBox};
use crate::error::{Result, SoakError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

/// Picks recipients from the participants currently online.
///
/// A participant is eligible when they are not idle, not on the deny-list and
/// not the payer themselves. Shares are paid to `{name}@{recipient_domain}`.
pub struct RosterResolver {
    roster: RosterBox,
    deny_list: HashSet<String>,
    recipient_domain: String,
}

impl RosterResolver {
    pub fn new(
        roster: RosterBox,
        deny_list: impl IntoIterator<Item = String>,
        recipient_domain: impl Into<String>,
    ) -> Self {
        Self {
            roster,
            deny_list: deny_list.into_iter().collect(),
            recipient_domain: recipient_domain.into(),
        }
    }

    pub fn is_allowed(&self, participant_id: &str) -> bool {
        !self.deny_list.contains(participant_id)
    }
}

#[async_trait]
impl RecipientResolver for RosterResolver {
    async fn eligible(
        &self,
        _payment: &IncomingPayment,
        directive: &Directive,
    ) -> Result<Vec<Recipient>> {
        let payer = directive.username.as_deref();

        Ok(self
            .roster
            .participants()
            .await?
            .into_iter()
            .filter(|p| !p.afk && self.is_allowed(&p.id) && Some(p.name.as_str()) != payer)
            .map(|p| Recipient {
                address: format!("{}@{}", p.name, self.recipient_domain),
                id: p.id,
                name: p.name,
            })
            .collect())
    }
}

/// A fixed participant list.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    participants: Vec<Participant>,
}

impl StaticRoster {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self { participants }
    }
}

#[async_trait]
impl Roster for StaticRoster {
    async fn participants(&self) -> Result<Vec<Participant>> {
        Ok(self.participants.clone())
    }
}

/// Reads a JSON array of participants from disk on every lookup.
///
/// The file is expected to be kept current by whatever bridges the game
/// server's presence feed.
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Roster for FileRoster {
    async fn participants(&self) -> Result<Vec<Participant>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            SoakError::PresenceError(format!("cannot read roster {}: {e}", self.path.display()))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
