use crate::errors::QueueError;

pub const MAX_NAME_LEN: usize = 48;

/// Every named resource of one queue, derived from its logical name alone.
///
/// Senders rediscover the receiver's objects through these names; there is
/// no other coordination channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    queue: String,
}

impl ResourceNames {
    pub fn new(queue: &str) -> Result<ResourceNames, QueueError> {
        validate_name(queue)?;
        Ok(ResourceNames {
            queue: queue.to_string(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn region(&self) -> String {
        self.os_id("region")
    }

    pub fn lock(&self) -> String {
        self.os_id("lock")
    }

    pub fn presence(&self) -> String {
        self.os_id("presence")
    }

    pub fn space(&self) -> String {
        self.os_id("space")
    }

    pub fn permits(&self) -> String {
        self.os_id("permits")
    }

    pub fn ready(&self, index: u32) -> String {
        self.os_id(&format!("ready.{}", index))
    }

    /// Names that exist independently of how many senders were expected.
    pub fn fixed(&self) -> [String; 5] {
        [
            self.region(),
            self.lock(),
            self.presence(),
            self.space(),
            self.permits(),
        ]
    }

    #[cfg(unix)]
    fn os_id(&self, suffix: &str) -> String {
        // POSIX shm_open names are a single path component rooted at '/'.
        format!("/{}.{}", self.queue, suffix)
    }

    #[cfg(not(unix))]
    fn os_id(&self, suffix: &str) -> String {
        format!("{}.{}", self.queue, suffix)
    }
}

pub fn validate_name(queue: &str) -> Result<(), QueueError> {
    if queue.is_empty() || queue.len() > MAX_NAME_LEN {
        return Err(QueueError::InvalidConfig(format!(
            "queue name must be 1..={} characters, got {}",
            MAX_NAME_LEN,
            queue.len()
        )));
    }
    if let Some(c) = queue
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(QueueError::InvalidConfig(format!(
            "queue name {:?} contains {:?}; only [A-Za-z0-9_-] are allowed",
            queue, c
        )));
    }
    Ok(())
}
