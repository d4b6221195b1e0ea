//! Déchiffrement des locators `signatureCipher`
//!
//! Certains formats ne portent pas d'URL directe mais une chaîne
//! `s=<signature brouillée>&sp=<nom du paramètre>&url=<url encodée>`. La
//! transformation de la signature dépend du lecteur JavaScript du moment ;
//! elle est donc injectée via [`SignatureDecipher`].

use reqwest::Url;

/// Composants d'une chaîne `signatureCipher`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParts {
    pub url: String,
    /// Signature brouillée (`s`), absente si l'URL est déjà utilisable
    pub scrambled_signature: Option<String>,
    /// Nom du paramètre de signature (`sp`, "signature" par défaut)
    pub signature_param: String,
}

impl CipherParts {
    pub fn parse(cipher: &str) -> Option<Self> {
        let fake = Url::parse(&format!("https://cipher.invalid/?{}", cipher)).ok()?;
        let mut url = None;
        let mut scrambled_signature = None;
        let mut signature_param = "signature".to_string();
        for (key, value) in fake.query_pairs() {
            match key.as_ref() {
                "url" => url = Some(value.into_owned()),
                "s" => scrambled_signature = Some(value.into_owned()),
                "sp" => signature_param = value.into_owned(),
                _ => {}
            }
        }
        Some(Self {
            url: url?,
            scrambled_signature,
            signature_param,
        })
    }

    /// URL complétée avec une signature déjà transformée
    pub fn signed_url(&self, signature: &str) -> Option<String> {
        let mut url = Url::parse(&self.url).ok()?;
        url.query_pairs_mut()
            .append_pair(&self.signature_param, signature);
        Some(url.into())
    }
}

pub trait SignatureDecipher: Send + Sync {
    /// URL jouable pour une chaîne `signatureCipher`, ou `None` si le
    /// déchiffrement est impossible
    fn decipher(&self, cipher: &str) -> Option<String>;
}

/// N'accepte que les chaînes qui portent une URL sans signature brouillée
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedOnly;

impl SignatureDecipher for UnsignedOnly {
    fn decipher(&self, cipher: &str) -> Option<String> {
        let parts = CipherParts::parse(cipher)?;
        match parts.scrambled_signature {
            None => Some(parts.url),
            Some(_) => None,
        }
    }
}
