use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Absent only on assistant turns that consist solely of tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Plain-text view of the content, empty when there is none
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::to_plain_text).unwrap_or_default()
    }
}

/// Message content: a plain string or an ordered list of typed parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// The string form, if this content is plain text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(_) => None,
        }
    }

    /// The part list, if this content is structured
    pub fn as_parts(&self) -> Option<&[ContentPart]> {
        match self {
            Self::Text(_) => None,
            Self::Parts(parts) => Some(parts),
        }
    }

    /// Concatenate every text part, dropping images
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }
}

/// A typed part of structured content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference: a remote URL or a `data:` URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ImageUrl {
    /// Split a base64 `data:` URI into `(media_type, data)`
    pub fn as_inline_data(&self) -> Option<(&str, &str)> {
        let rest = self.url.strip_prefix("data:")?;
        let (meta, data) = rest.split_once(',')?;
        let media_type = meta.strip_suffix(";base64")?;
        Some((media_type, data))
    }
}

/// A tool invocation requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

/// Function name and JSON-encoded arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

pub(crate) fn function_kind() -> String {
    "function".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_content_is_text() {
        let message: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        let content = message.content.unwrap();
        assert_eq!(content.as_text(), Some("hi"));
        assert!(content.as_parts().is_none());
    }

    #[test]
    fn array_content_is_parts() {
        let raw = r#"{"role":"user","content":[
            {"type":"text","text":"look at "},
            {"type":"image_url","image_url":{"url":"data:image/png;base64,AAAA"}},
            {"type":"text","text":"this"}
        ]}"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        let content = message.content.as_ref().unwrap();

        assert!(content.as_text().is_none());
        assert_eq!(content.as_parts().map(<[_]>::len), Some(3));
        assert_eq!(message.text(), "look at this");
    }

    #[test]
    fn inline_image_data_is_split() {
        let image = ImageUrl {
            url: "data:image/jpeg;base64,/9j/4AAQ".to_owned(),
            detail: None,
        };
        assert_eq!(image.as_inline_data(), Some(("image/jpeg", "/9j/4AAQ")));

        let remote = ImageUrl {
            url: "https://example.com/cat.png".to_owned(),
            detail: None,
        };
        assert!(remote.as_inline_data().is_none());
    }

    #[test]
    fn assistant_tool_call_without_content() {
        let raw = r#"{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_1","type":"function","function":{"name":"lookup","arguments":"{}"}}
        ]}"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls.unwrap()[0].function.name, "lookup");
    }
}
