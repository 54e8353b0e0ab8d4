//! Business backends behind the built-in tools.
//!
//! Each tool talks to a trait, never to a concrete service. The in-memory
//! implementations here back the tests and the CLI; production deployments
//! plug in their own Stripe, database and analytics adapters.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use orquesta_core::error::CollaboratorError;
use orquesta_core::tenant::Credentials;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// --- Payments ---

/// A hosted checkout link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a checkout link for `amount` (major units) in `currency`.
    async fn create_link(
        &self,
        credentials: &Credentials,
        amount: f64,
        currency: &str,
        description: &str,
    ) -> Result<PaymentLink, CollaboratorError>;
}

/// Issues fake checkout URLs; requires a `secret_key` credential.
#[derive(Debug, Default)]
pub struct InMemoryPayments {
    issued: Mutex<Vec<(PaymentLink, f64, String)>>,
}

impl InMemoryPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links issued so far, with amount and currency.
    pub async fn issued(&self) -> Vec<(PaymentLink, f64, String)> {
        self.issued.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPayments {
    async fn create_link(
        &self,
        credentials: &Credentials,
        amount: f64,
        currency: &str,
        _description: &str,
    ) -> Result<PaymentLink, CollaboratorError> {
        if credentials.get("secret_key").is_none_or(str::is_empty) {
            return Err(CollaboratorError::Rejected(
                "stripe credentials are missing a secret_key".into(),
            ));
        }
        let id = format!("plink_{}", uuid::Uuid::new_v4().simple());
        let link = PaymentLink {
            url: format!("https://buy.stripe.com/test/{id}"),
            id,
        };
        self.issued
            .lock()
            .await
            .push((link.clone(), amount, currency.to_string()));
        Ok(link)
    }
}

// --- Reminders ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub chatbot_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields of a reminder to be created.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub chatbot_id: String,
    pub title: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub email: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl ReminderPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.date.is_none() && self.time.is_none()
    }
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Create a reminder. Returns the stored reminder and whether it is new;
    /// an identical pending reminder is returned instead of a duplicate.
    async fn create(&self, reminder: NewReminder) -> Result<(Reminder, bool), CollaboratorError>;

    /// Reminders of a chatbot ordered by date and time.
    async fn list(
        &self,
        chatbot_id: &str,
        include_cancelled: bool,
    ) -> Result<Vec<Reminder>, CollaboratorError>;

    async fn update(
        &self,
        chatbot_id: &str,
        id: &str,
        patch: ReminderPatch,
    ) -> Result<Reminder, CollaboratorError>;

    async fn cancel(&self, chatbot_id: &str, id: &str) -> Result<Reminder, CollaboratorError>;
}

#[derive(Debug, Default)]
pub struct InMemoryReminders {
    reminders: Mutex<Vec<Reminder>>,
}

impl InMemoryReminders {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> CollaboratorError {
    CollaboratorError::Rejected(format!("reminder '{id}' not found"))
}

#[async_trait]
impl ReminderStore for InMemoryReminders {
    async fn create(&self, new: NewReminder) -> Result<(Reminder, bool), CollaboratorError> {
        let mut reminders = self.reminders.lock().await;
        if let Some(existing) = reminders.iter().find(|r| {
            r.status == ReminderStatus::Pending
                && r.chatbot_id == new.chatbot_id
                && r.title == new.title
                && r.date == new.date
                && r.time == new.time
        }) {
            return Ok((existing.clone(), false));
        }

        let reminder = Reminder {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            chatbot_id: new.chatbot_id,
            title: new.title,
            date: new.date,
            time: new.time,
            email: new.email,
            notes: new.notes,
            status: ReminderStatus::Pending,
            created_at: Utc::now(),
        };
        reminders.push(reminder.clone());
        Ok((reminder, true))
    }

    async fn list(
        &self,
        chatbot_id: &str,
        include_cancelled: bool,
    ) -> Result<Vec<Reminder>, CollaboratorError> {
        let mut found: Vec<Reminder> = self
            .reminders
            .lock()
            .await
            .iter()
            .filter(|r| r.chatbot_id == chatbot_id)
            .filter(|r| include_cancelled || r.status == ReminderStatus::Pending)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.time));
        Ok(found)
    }

    async fn update(
        &self,
        chatbot_id: &str,
        id: &str,
        patch: ReminderPatch,
    ) -> Result<Reminder, CollaboratorError> {
        let mut reminders = self.reminders.lock().await;
        let reminder = reminders
            .iter_mut()
            .find(|r| r.chatbot_id == chatbot_id && r.id == id)
            .ok_or_else(|| not_found(id))?;
        if reminder.status == ReminderStatus::Cancelled {
            return Err(CollaboratorError::Rejected(format!(
                "reminder '{id}' is cancelled"
            )));
        }
        if let Some(title) = patch.title {
            reminder.title = title;
        }
        if let Some(date) = patch.date {
            reminder.date = date;
        }
        if let Some(time) = patch.time {
            reminder.time = time;
        }
        Ok(reminder.clone())
    }

    async fn cancel(&self, chatbot_id: &str, id: &str) -> Result<Reminder, CollaboratorError> {
        let mut reminders = self.reminders.lock().await;
        let reminder = reminders
            .iter_mut()
            .find(|r| r.chatbot_id == chatbot_id && r.id == id)
            .ok_or_else(|| not_found(id))?;
        reminder.status = ReminderStatus::Cancelled;
        Ok(reminder.clone())
    }
}

// --- Contacts ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub chatbot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Insert or merge a lead, matched by email or phone within a chatbot.
    /// Returns the stored contact and whether it is new.
    async fn upsert(&self, contact: Contact) -> Result<(Contact, bool), CollaboratorError>;
}

#[derive(Debug, Default)]
pub struct InMemoryContacts {
    contacts: Mutex<Vec<Contact>>,
}

impl InMemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Contact> {
        self.contacts.lock().await.clone()
    }
}

fn same_lead(a: &Contact, b: &Contact) -> bool {
    let email = matches!((&a.email, &b.email), (Some(x), Some(y)) if x.eq_ignore_ascii_case(y));
    let phone = matches!((&a.phone, &b.phone), (Some(x), Some(y)) if x == y);
    a.chatbot_id == b.chatbot_id && (email || phone)
}

#[async_trait]
impl ContactStore for InMemoryContacts {
    async fn upsert(&self, contact: Contact) -> Result<(Contact, bool), CollaboratorError> {
        let mut contacts = self.contacts.lock().await;
        if let Some(existing) = contacts.iter_mut().find(|c| same_lead(c, &contact)) {
            existing.name = contact.name.or(existing.name.take());
            existing.email = contact.email.or(existing.email.take());
            existing.phone = contact.phone.or(existing.phone.take());
            existing.company = contact.company.or(existing.company.take());
            existing.notes = contact.notes.or(existing.notes.take());
            return Ok((existing.clone(), false));
        }
        contacts.push(contact.clone());
        Ok((contact, true))
    }
}

// --- Analytics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "dia" | "día" | "hoy" => Some(Self::Day),
            "week" | "semana" => Some(Self::Week),
            "month" | "mes" => Some(Self::Month),
            _ => None,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            Self::Day => chrono::Duration::days(1),
            Self::Week => chrono::Duration::days(7),
            Self::Month => chrono::Duration::days(30),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Day => "las últimas 24 horas",
            Self::Week => "los últimos 7 días",
            Self::Month => "los últimos 30 días",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatbotStats {
    pub conversations: u64,
    pub messages: u64,
    pub leads: u64,
}

#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn stats(
        &self,
        chatbot_id: &str,
        period: StatsPeriod,
    ) -> Result<ChatbotStats, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Conversation,
    Message,
    Lead,
}

/// Counts timestamped activity events per chatbot.
#[derive(Debug, Default)]
pub struct InMemoryAnalytics {
    events: Mutex<Vec<(String, ActivityKind, DateTime<Utc>)>>,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, chatbot_id: &str, kind: ActivityKind, at: DateTime<Utc>) {
        self.events
            .lock()
            .await
            .push((chatbot_id.to_string(), kind, at));
    }
}

#[async_trait]
impl AnalyticsSource for InMemoryAnalytics {
    async fn stats(
        &self,
        chatbot_id: &str,
        period: StatsPeriod,
    ) -> Result<ChatbotStats, CollaboratorError> {
        let since = Utc::now() - period.duration();
        let mut stats = ChatbotStats::default();
        for (_, kind, _) in self
            .events
            .lock()
            .await
            .iter()
            .filter(|(bot, _, at)| bot == chatbot_id && *at >= since)
        {
            match kind {
                ActivityKind::Conversation => stats.conversations += 1,
                ActivityKind::Message => stats.messages += 1,
                ActivityKind::Lead => stats.leads += 1,
            }
        }
        Ok(stats)
    }
}

/// The set of backends the tool catalog is built over.
#[derive(Clone)]
pub struct ToolBackends {
    pub payments: Arc<dyn PaymentGateway>,
    pub reminders: Arc<dyn ReminderStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub analytics: Arc<dyn AnalyticsSource>,
}

impl ToolBackends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            payments: Arc::new(InMemoryPayments::new()),
            reminders: Arc::new(InMemoryReminders::new()),
            contacts: Arc::new(InMemoryContacts::new()),
            analytics: Arc::new(InMemoryAnalytics::new()),
        }
    }
}
