//! Input validation for API requests.
//!
//! Validation functions return `Result<(), String>` so handlers can
//! collect failures per field with the `ValidationErrorBuilder` from the
//! `error` module.

use lazy_static::lazy_static;
use regex::Regex;

/// Image extensions accepted for room images
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

lazy_static! {
    /// Regex for a reasonable email shape (full RFC validation is not the goal)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)+$"
    ).unwrap();

    /// Regex for phone numbers: optional +, digits, spaces, dashes
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9][0-9 \-]{4,18}[0-9]$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }

    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }

    if name.len() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Validate a phone number (optional field)
pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    if let Some(p) = phone {
        if p.is_empty() {
            return Ok(()); // Empty string treated as no phone
        }

        if !PHONE_REGEX.is_match(p) {
            return Err("Invalid phone number format".to_string());
        }
    }

    Ok(())
}

/// Validate a room image URL.
///
/// The URL must be HTTP(S) and its path must end in one of the allowed
/// image extensions. The error names the offending extension and the
/// allowed set so the caller can correct the input.
pub fn validate_image_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("Image URL is required".to_string());
    }

    if url.len() > 2048 {
        return Err("Image URL is too long (max 2048 characters)".to_string());
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("Image URL must be an HTTP(S) URL".to_string());
    }

    // Extension check applies to the path only, not query or fragment
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or("");

    let file = path.rfind('/').map(|i| &path[i + 1..]).unwrap_or("");
    let ext = file
        .rfind('.')
        .map(|dot| file[dot..].to_lowercase())
        .unwrap_or_default();

    if !ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(format!(
            "Unsupported file extension: '{}'. Allowed: {}",
            ext,
            ALLOWED_IMAGE_EXTENSIONS.join(", ")
        ));
    }

    Ok(())
}

/// Validate a room type label
pub fn validate_room_type(room_type: &str) -> Result<(), String> {
    if room_type.trim().is_empty() {
        return Err("Room type is required".to_string());
    }

    if room_type.len() > 50 {
        return Err("Room type is too long (max 50 characters)".to_string());
    }

    Ok(())
}

/// Validate a price in cents
pub fn validate_price_cents(price_cents: i64) -> Result<(), String> {
    if price_cents < 0 {
        return Err("Price must not be negative".to_string());
    }

    Ok(())
}

/// Validate a room's guest capacity
pub fn validate_max_guests(max_guests: i64) -> Result<(), String> {
    if max_guests < 1 {
        return Err("Guest capacity must be at least 1".to_string());
    }

    if max_guests > 50 {
        return Err("Guest capacity is too high (max 50)".to_string());
    }

    Ok(())
}

/// Validate a service name
pub fn validate_service_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Service name is required".to_string());
    }

    if name.len() > 100 {
        return Err("Service name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("guest@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.example.co").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone(&Some("+49 170 1234567".to_string())).is_ok());
        assert!(validate_phone(&Some("0170-1234567".to_string())).is_ok());
        assert!(validate_phone(&Some("".to_string())).is_ok());
        assert!(validate_phone(&None).is_ok());

        assert!(validate_phone(&Some("call me".to_string())).is_err());
        assert!(validate_phone(&Some("12".to_string())).is_err());
    }

    #[test]
    fn test_validate_image_url_allowed_extensions() {
        assert!(validate_image_url("https://cdn.example.com/rooms/101.jpg").is_ok());
        assert!(validate_image_url("https://cdn.example.com/rooms/101.JPEG").is_ok());
        assert!(validate_image_url("http://cdn.example.com/a/b/c.png").is_ok());
        assert!(validate_image_url("https://cdn.example.com/x.webp?size=large").is_ok());
    }

    #[test]
    fn test_validate_image_url_rejections() {
        assert!(validate_image_url("").is_err());
        assert!(validate_image_url("ftp://cdn.example.com/room.jpg").is_err());
        assert!(validate_image_url("https://cdn.example.com/rooms/101").is_err());

        let err = validate_image_url("https://cdn.example.com/room.gif").unwrap_err();
        assert!(err.contains(".gif"));
        assert!(err.contains(".jpg"));
        assert!(err.contains(".webp"));
    }

    #[test]
    fn test_validate_image_url_ignores_query_extension() {
        // The extension must come from the path, not the query string
        assert!(validate_image_url("https://cdn.example.com/room?file=a.jpg").is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(10000).is_ok());
        assert!(validate_price_cents(-1).is_err());
    }

    #[test]
    fn test_validate_max_guests() {
        assert!(validate_max_guests(1).is_ok());
        assert!(validate_max_guests(4).is_ok());
        assert!(validate_max_guests(0).is_err());
        assert!(validate_max_guests(500).is_err());
    }

    #[test]
    fn test_validate_room_type() {
        assert!(validate_room_type("double deluxe").is_ok());
        assert!(validate_room_type("").is_err());
        assert!(validate_room_type("   ").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "room_id").is_ok());
        assert!(validate_uuid("", "room_id").is_err());
        assert!(validate_uuid("not-a-uuid", "room_id").is_err());
    }
}
