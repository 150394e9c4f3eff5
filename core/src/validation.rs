// Input rules shared by the membership and broadcast protocols

pub const MAX_MESSAGE_LEN: usize = 500;

/// Usernames: 2-20 chars of letters, digits and underscores
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }
    let len = username.chars().count();
    if len < 2 {
        return Err("Username must be at least 2 characters".to_string());
    }
    if len > 20 {
        return Err("Username must be 20 characters or less".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err("Username can only contain letters, numbers, and underscores".to_string());
    }
    Ok(())
}

pub fn validate_room_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Room name is required".to_string());
    }
    let len = name.chars().count();
    if len < 3 {
        return Err("Room name must be at least 3 characters".to_string());
    }
    if len > 30 {
        return Err("Room name must be 30 characters or less".to_string());
    }
    Ok(())
}

pub fn validate_message(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message cannot be empty".to_string());
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(format!(
            "Message must be {MAX_MESSAGE_LEN} characters or less"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alex_01").is_ok());
        assert!(validate_username("a").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(21)).is_err());
    }

    #[test]
    fn test_room_name_rules() {
        assert!(validate_room_name("Coffee").is_ok());
        assert!(validate_room_name("ab").is_err());
        assert!(validate_room_name(&"r".repeat(31)).is_err());
    }

    #[test]
    fn test_message_length_counts_chars() {
        assert!(validate_message("hi").is_ok());
        assert!(validate_message(" \n ").is_err());
        assert!(validate_message(&"é".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(validate_message(&"é".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }
}
