//! Course model - the unit a learner enrolls in.

use serde::{Deserialize, Serialize};
use crate::id::{CategoryId, CourseId, UserId};
use crate::error::ModelError;
use crate::Time;

/// A course authored by an instructor and composed of lessons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Course title
    pub title: String,

    /// URL slug derived from the title
    pub slug: String,

    /// Detailed description
    pub description: String,

    /// Authoring instructor
    pub instructor_id: UserId,

    /// Category, if assigned
    pub category_id: Option<CategoryId>,

    /// Whether enrollment is paid
    pub is_paid: bool,

    /// Price, informational only
    pub price: f64,

    /// When created
    pub created_at: Time,

    /// Last updated
    pub updated_at: Time,
}

impl Course {
    /// Create a new free course.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        instructor_id: UserId,
    ) -> Result<Self, ModelError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(ModelError::Missing("course title"));
        }
        let now = chrono::Utc::now();
        Ok(Self {
            id: CourseId::new(),
            slug: slugify(&title),
            title,
            description: description.into(),
            instructor_id,
            category_id: None,
            is_paid: false,
            price: 0.0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Assign a category.
    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Mark the course as paid at the given price.
    pub fn with_price(mut self, price: f64) -> Result<Self, ModelError> {
        if price < 0.0 {
            return Err(ModelError::NegativePrice);
        }
        self.is_paid = price > 0.0;
        self.price = price;
        Ok(self)
    }
}

/// Lowercase, hyphen-separated slug of `title`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
