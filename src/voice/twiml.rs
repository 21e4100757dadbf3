//! TwiML generation
//!
//! Builds the voice markup returned to Twilio at each step of the call: the
//! opening prompt with its speech `<Gather>`, and the closing line once the
//! answer is in. Everything here is a pure function of its inputs.

use super::config::ScriptConfig;
use url::Url;

/// Content type Twilio expects for TwiML responses
pub const TWIML_CONTENT_TYPE: &str = "application/xml";

/// Path Twilio posts the gathered speech to
pub const SPEECH_RESULT_PATH: &str = "handle-recording";

/// Speech `<Gather>` settings
#[derive(Debug, Clone)]
pub struct Gather {
    /// Callback receiving `SpeechResult`
    pub action: String,
    /// HTTP method for the callback
    pub method: String,
    /// Recognition locale
    pub language: String,
    /// End-of-speech detection
    pub speech_timeout: String,
    /// Phrases the recognizer should favour
    pub hints: Vec<String>,
}

/// Incremental TwiML document builder
#[derive(Debug, Clone, Default)]
pub struct TwimlBuilder {
    verbs: Vec<String>,
}

impl TwimlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<Say>` with voice and language
    pub fn say(mut self, text: &str, voice: &str, language: &str) -> Self {
        self.verbs.push(format!(
            r#"<Say voice="{}" language="{}">{}</Say>"#,
            escape_xml(voice),
            escape_xml(language),
            escape_xml(text)
        ));
        self
    }

    /// `<Play>` an audio URL
    pub fn play(mut self, url: &str) -> Self {
        self.verbs.push(format!("<Play>{}</Play>", escape_xml(url)));
        self
    }

    /// Speech-only `<Gather>`
    pub fn gather(mut self, gather: &Gather) -> Self {
        let mut attrs = format!(
            r#"input="speech" language="{}" speechTimeout="{}" action="{}" method="{}""#,
            escape_xml(&gather.language),
            escape_xml(&gather.speech_timeout),
            escape_xml(&gather.action),
            escape_xml(&gather.method)
        );
        if !gather.hints.is_empty() {
            attrs.push_str(&format!(r#" hints="{}""#, escape_xml(&gather.hints.join(","))));
        }
        self.verbs.push(format!("<Gather {} />", attrs));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push("<Hangup />".to_string());
        self
    }

    /// Render the document
    pub fn build(self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n");
        for verb in self.verbs {
            out.push_str("    ");
            out.push_str(&verb);
            out.push('\n');
        }
        out.push_str("</Response>");
        out
    }
}

/// Stateless builder for the call's scripts
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    config: ScriptConfig,
    hints: Vec<String>,
}

impl ScriptBuilder {
    /// `hints` are passed to the recognizer as expected phrases
    pub fn new(config: ScriptConfig, hints: Vec<String>) -> Self {
        Self { config, hints }
    }

    /// Greeting, beep, speech gather, then the no-input fallback line
    pub fn prompt(&self, issue: Option<&str>, base_url: &Url) -> String {
        let issue = issue.map(str::trim).filter(|i| !i.is_empty());
        let greeting = match issue {
            Some(issue) => format!("Hello. We are calling about {}. {}", issue, self.config.greeting),
            None => format!("Hello. {}", self.config.greeting),
        };

        let mut action = callback_url(base_url, SPEECH_RESULT_PATH);
        if let Some(issue) = issue {
            action.push_str("?issue=");
            action.push_str(&urlencoding::encode(issue));
        }

        let mut twiml = TwimlBuilder::new().say(&greeting, &self.config.voice, &self.config.language);
        if let Some(beep) = self.config.beep_url.as_deref().filter(|b| !b.is_empty()) {
            twiml = twiml.play(beep);
        }
        twiml
            .gather(&Gather {
                action,
                method: "POST".to_string(),
                language: self.config.language.clone(),
                speech_timeout: "auto".to_string(),
                hints: self.hints.clone(),
            })
            .say(
                &self.config.fallback_message,
                &self.config.voice,
                &self.config.language,
            )
            .build()
    }

    /// Fallback line, then hang up
    pub fn farewell(&self) -> String {
        TwimlBuilder::new()
            .say(
                &self.config.fallback_message,
                &self.config.voice,
                &self.config.language,
            )
            .hangup()
            .build()
    }

    /// Closing line after the answer was captured
    pub fn acknowledgement(&self, speech: Option<&str>) -> String {
        let text = match speech.map(str::trim).filter(|s| !s.is_empty()) {
            Some(speech) => format!("Thank you, {}. We have recorded your response.", speech),
            None => "Thank you. Goodbye.".to_string(),
        };
        TwimlBuilder::new()
            .say(&text, &self.config.voice, &self.config.language)
            .build()
    }
}

/// Absolute URL for one of this service's endpoints under `base`
pub fn callback_url(base: &Url, path: &str) -> String {
    let mut url = base.clone();
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Escape text for XML content and attribute values
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
