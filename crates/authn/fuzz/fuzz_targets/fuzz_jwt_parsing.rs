//! Fuzz target for token parsing and claim validation.
//!
//! Feeds arbitrary byte strings as bearer headers and tokens to the parsing
//! and claim validation functions. Every result must be either `Ok(...)` or
//! `Err(AuthError)`; no input may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use openid_authn::{
    AudienceCondition, Provider, ProviderRegistry, extract_bearer_token,
    jwt::{decode_claims, decode_header, validate_claims},
};

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8; header values reach us as strings
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let token = extract_bearer_token(Some(input)).unwrap_or(input);

    let _ = decode_header(token);

    if let Ok(claims) = decode_claims(token) {
        let Ok(provider) = Provider::new("https://idp.example", AudienceCondition::list(["client-1"]))
        else {
            return;
        };
        let _ = validate_claims(&claims, &ProviderRegistry::new(vec![provider]));
        let _ = validate_claims(&claims, &ProviderRegistry::default());
    }
});
