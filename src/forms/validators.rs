use super::models::{ContactMessage, DemoRequest, FormSubmission, JobApplication, TrialSignup};
use crate::common::{ValidationResult, Validator};

const MAX_NAME_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 5000;
const MAX_TEAM_SIZE: u32 = 100_000;
const TRIAL_PLANS: &[&str] = &["starter", "growth", "enterprise"];

fn optional_text(result: &mut ValidationResult, field: &str, value: Option<&str>, max_len: usize) {
    if let Some(v) = value {
        if v.chars().count() > max_len {
            result.add_error(field, &format!("must not exceed {} characters", max_len));
        }
    }
}

impl Validator<DemoRequest> for DemoRequest {
    fn validate(&self, data: &DemoRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_text("name", &data.name, MAX_NAME_LEN);
        result.require_email("email", &data.email);
        result.require_text("company", &data.company, MAX_NAME_LEN);

        if let Some(size) = data.team_size {
            if size == 0 || size > MAX_TEAM_SIZE {
                result.add_error("teamSize", "must be between 1 and 100000");
            }
        }
        optional_text(&mut result, "message", data.message.as_deref(), MAX_MESSAGE_LEN);
        result
    }
}

impl Validator<ContactMessage> for ContactMessage {
    fn validate(&self, data: &ContactMessage) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_text("name", &data.name, MAX_NAME_LEN);
        result.require_email("email", &data.email);
        optional_text(&mut result, "subject", data.subject.as_deref(), MAX_NAME_LEN);
        result.require_text("message", &data.message, MAX_MESSAGE_LEN);
        result
    }
}

impl Validator<TrialSignup> for TrialSignup {
    fn validate(&self, data: &TrialSignup) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_text("name", &data.name, MAX_NAME_LEN);
        result.require_email("email", &data.email);
        result.require_text("company", &data.company, MAX_NAME_LEN);

        if let Some(plan) = data.plan.as_deref() {
            if !TRIAL_PLANS.contains(&plan.trim().to_lowercase().as_str()) {
                result.add_error("plan", "must be one of: starter, growth, enterprise");
            }
        }
        result
    }
}

impl Validator<JobApplication> for JobApplication {
    fn validate(&self, data: &JobApplication) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.require_text("name", &data.name, MAX_NAME_LEN);
        result.require_email("email", &data.email);
        result.require_text("position", &data.position, MAX_NAME_LEN);

        if let Some(url) = data.portfolio_url.as_deref() {
            let url = url.trim();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                result.add_error("portfolioUrl", "must be an http(s) URL");
            }
        }
        optional_text(&mut result, "coverLetter", data.cover_letter.as_deref(), MAX_MESSAGE_LEN);
        result
    }
}

impl Validator<FormSubmission> for FormSubmission {
    fn validate(&self, data: &FormSubmission) -> ValidationResult {
        match data {
            FormSubmission::Demo(f) => f.validate(f),
            FormSubmission::Contact(f) => f.validate(f),
            FormSubmission::Trial(f) => f.validate(f),
            FormSubmission::Application(f) => f.validate(f),
        }
    }
}
