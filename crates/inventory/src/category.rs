use serde::{Deserialize, Serialize};

use stockadoodle_core::{CategoryId, DomainResult, Entity, Violations};

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 255;

/// Product grouping. Names are unique, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Create / rename payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryInput {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        let len = self.name.trim().chars().count();
        v.check(
            !(NAME_MIN..=NAME_MAX).contains(&len),
            format!("category name must be {NAME_MIN}-{NAME_MAX} characters"),
        );
        if let Some(d) = &self.description {
            v.check(
                d.chars().count() > DESCRIPTION_MAX,
                format!("description must be at most {DESCRIPTION_MAX} characters"),
            );
        }
        v.finish()
    }
}

impl Category {
    pub fn create(input: CategoryInput) -> DomainResult<Self> {
        input.validate()?;
        Ok(Self {
            id: CategoryId::new(),
            name: input.name.trim().to_string(),
            description: clean(input.description),
        })
    }

    pub fn update(&mut self, input: CategoryInput) -> DomainResult<()> {
        input.validate()?;
        self.name = input.name.trim().to_string();
        self.description = clean(input.description);
        Ok(())
    }

    /// Case-insensitive name comparison used for uniqueness checks.
    pub fn same_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other.trim())
    }
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
