//! TwiML document building
//!
//! Typed serialization of the TwiML verbs the voice webhooks emit. Documents
//! are built as a `VoiceResponse` and rendered with [`render`], which adds
//! the XML declaration Twilio expects.

use xmlserde_derives::XmlSerialize;

#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
#[xmlserde(root = b"Response")]
pub struct VoiceResponse {
    #[xmlserde(ty = "untag")]
    pub verbs: Vec<Verb>,
}

#[derive(Debug, PartialEq, Eq, XmlSerialize)]
pub enum Verb {
    #[xmlserde(name = b"Say")]
    Say(Say),
    #[xmlserde(name = b"Play")]
    Play(Play),
    #[xmlserde(name = b"Gather")]
    Gather(Gather),
    #[xmlserde(name = b"Redirect")]
    Redirect(Redirect),
    #[xmlserde(name = b"Hangup")]
    Hangup(Hangup),
}

#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
pub struct Say {
    #[xmlserde(ty = "text")]
    pub text: String,
    #[xmlserde(name = b"voice", ty = "attr")]
    pub voice: Option<String>,
    #[xmlserde(name = b"language", ty = "attr")]
    pub language: Option<String>,
}

#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
pub struct Play {
    #[xmlserde(ty = "text")]
    pub url: String,
}

/// Speech gather. Nested verbs play while the gather listens.
#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
pub struct Gather {
    #[xmlserde(name = b"input", ty = "attr")]
    pub input: Option<String>,
    #[xmlserde(name = b"action", ty = "attr")]
    pub action: Option<String>,
    #[xmlserde(name = b"method", ty = "attr")]
    pub method: Option<String>,
    #[xmlserde(name = b"language", ty = "attr")]
    pub language: Option<String>,
    #[xmlserde(name = b"speechTimeout", ty = "attr")]
    pub speech_timeout: Option<String>,
    #[xmlserde(name = b"speechModel", ty = "attr")]
    pub speech_model: Option<String>,
    #[xmlserde(ty = "untag")]
    pub verbs: Vec<Verb>,
}

#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
pub struct Redirect {
    #[xmlserde(ty = "text")]
    pub url: String,
    #[xmlserde(name = b"method", ty = "attr")]
    pub method: Option<String>,
}

#[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
pub struct Hangup {
    #[xmlserde(ty = "text")]
    pub text: String,
}

pub fn render(response: VoiceResponse) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
        xmlserde::xml_serialize(response)
    )
}

/// A speech gather posting to `action`, speaking or playing the given
/// utterance while listening.
pub fn gather_with_speech(action: &str, language: &str, utterance: Verb) -> Verb {
    Verb::Gather(Gather {
        input: Some("speech".into()),
        action: Some(action.into()),
        method: Some("POST".into()),
        language: Some(language.into()),
        speech_timeout: Some("auto".into()),
        speech_model: Some("phone_call".into()),
        verbs: vec![utterance],
    })
}

pub fn say(text: &str, language: &str) -> Verb {
    Verb::Say(Say {
        text: text.into(),
        voice: Some("alice".into()),
        language: Some(language.into()),
    })
}

pub fn play(url: &str) -> Verb {
    Verb::Play(Play { url: url.into() })
}

pub fn hangup() -> Verb {
    Verb::Hangup(Hangup::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_say_then_hangup() {
        let doc = render(VoiceResponse {
            verbs: vec![say("Auf Wiederhoeren.", "de-DE"), hangup()],
        });
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(doc.contains("<Say voice=\"alice\" language=\"de-DE\">Auf Wiederhoeren.</Say>"));
        assert!(doc.contains("<Hangup"));
    }

    #[test]
    fn gather_nests_the_utterance() {
        let doc = render(VoiceResponse {
            verbs: vec![gather_with_speech(
                "/webhooks/twilio/gather",
                "de-DE",
                play("https://example.com/audio/abc.mp3"),
            )],
        });
        assert!(doc.contains("input=\"speech\""));
        assert!(doc.contains("action=\"/webhooks/twilio/gather\""));
        assert!(doc.contains("<Play>https://example.com/audio/abc.mp3</Play>"));
    }
}
