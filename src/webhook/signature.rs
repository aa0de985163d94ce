use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::webhook::config::WebhookSecret;

type HmacSha256 = Hmac<Sha256>;

/// How the processor renders the HMAC digest in the signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

impl FromStr for SignatureEncoding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(SignatureEncoding::Hex),
            "base64" => Ok(SignatureEncoding::Base64),
            other => Err(format!("unknown signature encoding: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVerdict {
    Valid,
    Invalid,
}

pub trait SignatureVerifier: Send + Sync {
    /// `raw_body` must be the bytes exactly as received.
    fn verify(&self, raw_body: &[u8], token: &str) -> SignatureVerdict;
}

pub struct HmacSha256Verifier {
    secret: WebhookSecret,
    encoding: SignatureEncoding,
}

impl HmacSha256Verifier {
    pub fn new(secret: WebhookSecret, encoding: SignatureEncoding) -> Self {
        Self { secret, encoding }
    }

    /// The token the processor would send for `raw_body`.
    pub fn sign(&self, raw_body: &[u8]) -> Option<String> {
        let tag = compute_tag(self.secret.expose(), raw_body)?;
        Some(match self.encoding {
            SignatureEncoding::Hex => hex::encode(tag),
            SignatureEncoding::Base64 => STANDARD.encode(tag),
        })
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn verify(&self, raw_body: &[u8], token: &str) -> SignatureVerdict {
        // Compared as text against the canonical rendering, so case changes
        // and padding in the token count as mutations.
        let Some(expected) = self.sign(raw_body) else {
            return SignatureVerdict::Invalid;
        };

        if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
            SignatureVerdict::Valid
        } else {
            SignatureVerdict::Invalid
        }
    }
}

fn compute_tag(secret: &[u8], raw_body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(raw_body);
    Some(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"id":"ev_1","type":"payment.captured"}"#;

    fn verifier(secret: &str, encoding: SignatureEncoding) -> HmacSha256Verifier {
        HmacSha256Verifier::new(WebhookSecret::new(secret), encoding)
    }

    #[test]
    fn matches_known_hmac_sha256_vector() {
        // RFC 4231 test case 2.
        let verifier = verifier("Jefe", SignatureEncoding::Hex);
        assert_eq!(
            verifier.sign(b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn accepts_its_own_signature_in_both_encodings() {
        for encoding in [SignatureEncoding::Hex, SignatureEncoding::Base64] {
            let verifier = verifier("whsec_test", encoding);
            let token = verifier.sign(BODY).unwrap();
            assert_eq!(verifier.verify(BODY, &token), SignatureVerdict::Valid);
        }
    }

    #[test]
    fn case_flipped_or_padded_tokens_are_rejected() {
        let hex_verifier = verifier("whsec_test", SignatureEncoding::Hex);
        let token = hex_verifier.sign(BODY).unwrap();
        let letter = token
            .find(|c: char| c.is_ascii_alphabetic())
            .expect("hex digest contains a letter");
        let mut flipped = token.clone();
        flipped.replace_range(letter..=letter, &token[letter..=letter].to_uppercase());

        for candidate in [
            flipped,
            token.to_uppercase(),
            format!(" {token}"),
            format!("{token} "),
            format!("{token}\n"),
        ] {
            assert_eq!(
                hex_verifier.verify(BODY, &candidate),
                SignatureVerdict::Invalid,
                "{candidate:?} was accepted"
            );
        }

        let b64_verifier = verifier("whsec_test", SignatureEncoding::Base64);
        let token = b64_verifier.sign(BODY).unwrap();
        let unpadded = token.trim_end_matches('=').to_string();
        for candidate in [unpadded, format!(" {token}"), format!("{token}\n")] {
            assert_eq!(
                b64_verifier.verify(BODY, &candidate),
                SignatureVerdict::Invalid,
                "{candidate:?} was accepted"
            );
        }
    }

    #[test]
    fn any_single_byte_change_to_the_body_is_rejected() {
        let verifier = verifier("whsec_test", SignatureEncoding::Hex);
        let token = verifier.sign(BODY).unwrap();
        for index in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            mutated[index] ^= 0x01;
            assert_eq!(
                verifier.verify(&mutated, &token),
                SignatureVerdict::Invalid,
                "mutation at byte {index} was accepted"
            );
        }
    }

    #[test]
    fn any_single_character_change_to_the_token_is_rejected() {
        let verifier = verifier("whsec_test", SignatureEncoding::Hex);
        let token = verifier.sign(BODY).unwrap();
        for index in 0..token.len() {
            let mut mutated = token.clone().into_bytes();
            mutated[index] = if mutated[index] == b'0' { b'1' } else { b'0' };
            let mutated = String::from_utf8(mutated).unwrap();
            assert_eq!(verifier.verify(BODY, &mutated), SignatureVerdict::Invalid);
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = verifier("other-secret", SignatureEncoding::Hex)
            .sign(BODY)
            .unwrap();
        assert_eq!(
            verifier("whsec_test", SignatureEncoding::Hex).verify(BODY, &token),
            SignatureVerdict::Invalid
        );
    }

    #[test]
    fn reserialized_json_does_not_verify() {
        let verifier = verifier("whsec_test", SignatureEncoding::Hex);
        let raw = br#"{ "id": "ev_1",  "type": "payment.captured" }"#;
        let token = verifier.sign(raw).unwrap();
        let value: serde_json::Value = serde_json::from_slice(raw).unwrap();
        let reserialized = serde_json::to_vec(&value).unwrap();
        assert_eq!(verifier.verify(raw, &token), SignatureVerdict::Valid);
        assert_eq!(verifier.verify(&reserialized, &token), SignatureVerdict::Invalid);
    }

    #[test]
    fn undecodable_or_truncated_tokens_are_rejected() {
        let verifier = verifier("whsec_test", SignatureEncoding::Hex);
        let token = verifier.sign(BODY).unwrap();
        assert_eq!(verifier.verify(BODY, "not-hex"), SignatureVerdict::Invalid);
        assert_eq!(verifier.verify(BODY, ""), SignatureVerdict::Invalid);
        assert_eq!(
            verifier.verify(BODY, &token[..token.len() - 2]),
            SignatureVerdict::Invalid
        );
    }

    #[test]
    fn encoding_parses_case_insensitively() {
        assert_eq!("HEX".parse::<SignatureEncoding>(), Ok(SignatureEncoding::Hex));
        assert_eq!(" base64 ".parse::<SignatureEncoding>(), Ok(SignatureEncoding::Base64));
        assert!("sha1".parse::<SignatureEncoding>().is_err());
    }
}
