//! Form submission models

use serde::{Deserialize, Serialize};

/// Discriminant stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Demo,
    Contact,
    Trial,
    Application,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Demo => "demo",
            FormKind::Contact => "contact",
            FormKind::Trial => "trial",
            FormKind::Application => "application",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    pub name: String,
    pub email: String,
    pub company: String,
    #[serde(default)]
    pub team_size: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialSignup {
    pub name: String,
    pub email: String,
    pub company: String,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub name: String,
    pub email: String,
    pub position: String,
    #[serde(default)]
    pub portfolio_url: Option<String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
}

/// Body of `POST /api/forms`, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormSubmission {
    Demo(DemoRequest),
    Contact(ContactMessage),
    Trial(TrialSignup),
    Application(JobApplication),
}

impl FormSubmission {
    pub fn kind(&self) -> FormKind {
        match self {
            FormSubmission::Demo(_) => FormKind::Demo,
            FormSubmission::Contact(_) => FormKind::Contact,
            FormSubmission::Trial(_) => FormKind::Trial,
            FormSubmission::Application(_) => FormKind::Application,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            FormSubmission::Demo(f) => &f.email,
            FormSubmission::Contact(f) => &f.email,
            FormSubmission::Trial(f) => &f.email,
            FormSubmission::Application(f) => &f.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitFormResponse {
    pub ok: bool,
    pub id: String,
}
