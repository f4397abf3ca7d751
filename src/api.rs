//! HTTP access to the English school API.
//!
//! [`ApiRemote`] wraps a [`reqwest::Client`] together with the base URL of
//! the deployment under test. Every method maps to one endpoint of the API
//! surface; a non-2xx response or a transport error is returned as an error
//! and classified by the caller. There are no retries.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A remote deployment of the web application, reached over HTTP.
#[derive(Debug, Clone)]
pub struct ApiRemote {
    base_url: String,
    client: reqwest::Client,
}

impl ApiRemote {
    /// Creates a new `ApiRemote` targeting the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges a credential pair for a bearer token.
    pub async fn token(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(self.url("/api/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetches the authenticated user's profile.
    pub async fn profile(&self, token: &str) -> Result<Profile> {
        let response = self
            .client
            .get(self.url("/api/me"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetches the public teacher listing, no authentication required.
    pub async fn public_teachers(&self) -> Result<()> {
        self.client
            .get(self.url("/api/teachers/public"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches one of the static pages, such as `/` or `/team.html`.
    pub async fn page(&self, path: &str) -> Result<()> {
        self.client
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches the full teacher listing.
    pub async fn teachers(&self, token: &str) -> Result<()> {
        self.client
            .get(self.url("/api/teachers/"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches a single teacher record.
    pub async fn teacher(&self, token: &str, id: u64) -> Result<Teacher> {
        let response = self
            .client
            .get(self.url(&format!("/api/teachers/{id}")))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Resubmits a teacher record.
    pub async fn update_teacher(&self, token: &str, id: u64, teacher: &Teacher) -> Result<()> {
        self.client
            .put(self.url(&format!("/api/teachers/{id}")))
            .bearer_auth(token)
            .json(teacher)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches a single student record.
    pub async fn student(&self, token: &str, id: u64) -> Result<Student> {
        let response = self
            .client
            .get(self.url(&format!("/api/students/{id}")))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Resubmits a student record, including the password field the PUT
    /// endpoint requires.
    pub async fn update_student(&self, token: &str, id: u64, student: &StudentPayload) -> Result<()> {
        self.client
            .put(self.url(&format!("/api/students/{id}")))
            .bearer_auth(token)
            .json(student)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Registers a new student. Manager only.
    pub async fn create_student(&self, token: &str, student: &StudentPayload) -> Result<()> {
        self.client
            .post(self.url("/api/students/"))
            .bearer_auth(token)
            .json(student)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Creates a new teacher. Manager only.
    pub async fn create_teacher(&self, token: &str, teacher: &TeacherPayload) -> Result<()> {
        self.client
            .post(self.url("/api/teachers/"))
            .bearer_auth(token)
            .json(teacher)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Response of the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The bearer token used on all authenticated calls.
    pub access_token: String,
}

/// Response of the profile endpoint.
#[derive(Debug, Deserialize)]
pub struct Profile {
    /// Identifier of the authenticated user.
    pub id: u64,
    /// Role-specific extras; regular users carry their assigned teacher here.
    #[serde(default)]
    pub additional_info: Option<AdditionalInfo>,
}

/// Role-specific part of a [`Profile`].
#[derive(Debug, Deserialize)]
pub struct AdditionalInfo {
    /// The teacher assigned to a regular user.
    #[serde(default)]
    pub teacher_id: Option<u64>,
}

/// A teacher record as returned by and resubmitted to the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Age in years.
    pub age: u32,
    /// `"M"` or `"F"`.
    pub sex: String,
    /// CEFR qualification level, such as `"C2"`.
    pub qualification: String,
    /// Contact email, unique per teacher.
    pub email: String,
}

/// Body of the teacher creation endpoint: a record plus initial password.
#[derive(Debug, Serialize)]
pub struct TeacherPayload {
    /// The teacher record.
    #[serde(flatten)]
    pub teacher: Teacher,
    /// Initial login password.
    pub password: String,
}

/// A student record as returned by and resubmitted to the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Age in years.
    pub age: u32,
    /// `"M"` or `"F"`.
    pub sex: String,
    /// Contact email, unique per student.
    pub email: String,
    /// CEFR level, such as `"B1"`.
    pub level: String,
    /// Estimated vocabulary size in words.
    pub vocabulary: i64,
    /// The teacher this student is assigned to.
    pub teacher_id: u64,
}

/// Body of the student update and creation endpoints: a record plus password.
#[derive(Debug, Serialize)]
pub struct StudentPayload {
    /// The student record.
    #[serde(flatten)]
    pub student: Student,
    /// Login password, resubmitted unchanged on updates.
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_payload_serializes_flat() {
        let payload = StudentPayload {
            student: Student {
                first_name: "Alice".to_owned(),
                last_name: "Brown".to_owned(),
                age: 27,
                sex: "F".to_owned(),
                email: "alice@example.com".to_owned(),
                level: "B2".to_owned(),
                vocabulary: 1200,
                teacher_id: 1,
            },
            password: "password123".to_owned(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["vocabulary"], 1200);
        assert_eq!(value["password"], "password123");
        // the record fields must sit at the top level, not nested
        assert!(value.get("student").is_none());
    }

    #[test]
    fn profile_parses_without_additional_info() {
        let profile: Profile = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(profile.id, 7);
        assert!(profile.additional_info.is_none());

        let profile: Profile =
            serde_json::from_str(r#"{"id": 7, "additional_info": {"teacher_id": 3}}"#).unwrap();
        assert_eq!(profile.additional_info.unwrap().teacher_id, Some(3));
    }
}
