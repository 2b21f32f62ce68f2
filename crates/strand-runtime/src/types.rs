//! Run-level input and output types.

use strand_core::{
    Attachment, CoreError, Message, ReasoningLevel, StopReason, TokenUsage, UserContent,
    UserMessageContent,
};

/// Caller-supplied input for one run.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Prompt text.
    pub prompt: String,
    /// General attachments; always rendered as document blocks.
    pub attachments: Vec<Attachment>,
    /// Legacy single-purpose image field; rendered as image blocks only
    /// when the declared MIME type is `image/*`.
    pub legacy_images: Vec<Attachment>,
    /// Skill references attached to this turn.
    pub skill_refs: Vec<String>,
    /// Spell references attached to this turn.
    pub spell_refs: Vec<String>,
    /// Explicit reasoning level for this run.
    pub reasoning_level: Option<ReasoningLevel>,
}

impl RunOptions {
    /// Plain-text options with no attachments.
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Reject unusable input before any event is written.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty()
            && self.attachments.is_empty()
            && self.legacy_images.is_empty()
        {
            return Err(CoreError::EmptyPrompt);
        }
        for attachment in self.attachments.iter().chain(&self.legacy_images) {
            if attachment.data.is_empty() {
                return Err(CoreError::EmptyAttachment(attachment.file_name.clone()));
            }
        }
        Ok(())
    }

    /// Convert the prompt and attachments into user message content.
    ///
    /// A bare string when there are no attachments; otherwise an ordered
    /// block sequence: text, then legacy images, then attachments. Legacy
    /// entries whose MIME type is not `image/*` fall back to document
    /// blocks; general attachments are documents regardless of MIME family.
    #[must_use]
    pub fn user_content(&self) -> UserMessageContent {
        if self.attachments.is_empty() && self.legacy_images.is_empty() {
            return UserMessageContent::Text(self.prompt.clone());
        }

        let mut blocks = Vec::new();
        if !self.prompt.is_empty() {
            blocks.push(UserContent::Text {
                text: self.prompt.clone(),
            });
        }
        for image in &self.legacy_images {
            if image.is_image() {
                blocks.push(UserContent::Image {
                    data: image.data.clone(),
                    mime_type: image.mime_type.clone(),
                });
            } else {
                blocks.push(document_block(image));
            }
        }
        for attachment in &self.attachments {
            blocks.push(document_block(attachment));
        }
        UserMessageContent::Blocks(blocks)
    }
}

fn document_block(attachment: &Attachment) -> UserContent {
    UserContent::Document {
        data: attachment.data.clone(),
        mime_type: attachment.mime_type.clone(),
        file_name: attachment.file_name.clone(),
    }
}

/// Per-turn context handed to the model streaming collaborator.
///
/// Absent values stay `None` so downstream formatting can distinguish
/// "no context" from "empty context".
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    /// The live message list, user prompt included.
    pub messages: Vec<Message>,
    /// System prompt, when configured.
    pub system_prompt: Option<String>,
    /// Skill context assembled from this run's skill references.
    pub skill_context: Option<String>,
    /// Formatted results of subagents that settled since the last turn.
    pub subagent_context: Option<String>,
    /// Current todo context.
    pub todo_context: Option<String>,
    /// The session's persisted reasoning level.
    pub reasoning_level: Option<ReasoningLevel>,
}

/// How a run settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model finished naturally.
    Success {
        /// Final stop reason.
        stop_reason: StopReason,
        /// Usage accumulated across all turns of the run.
        usage: TokenUsage,
    },
    /// The run was interrupted; partial state was persisted.
    Interrupted,
}

/// Summary of one executed turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
    /// Turn number within the session.
    pub turn: u64,
    /// Stop reason, when the model settled.
    pub stop_reason: Option<StopReason>,
    /// API-reported usage for this turn.
    pub usage: Option<TokenUsage>,
    /// Tool calls the model requested this turn.
    pub tool_calls: usize,
    /// Whether this turn was cut short.
    pub interrupted: bool,
}

/// Result of a whole run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// How the run settled.
    pub outcome: RunOutcome,
    /// One report per executed turn.
    pub turns: Vec<TurnReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(mime: &str, name: Option<&str>) -> Attachment {
        Attachment {
            data: "aGVsbG8=".into(),
            mime_type: mime.into(),
            file_name: name.map(Into::into),
        }
    }

    #[test]
    fn empty_prompt_without_attachments_is_rejected() {
        assert!(matches!(
            RunOptions::text("  ").validate(),
            Err(CoreError::EmptyPrompt)
        ));
        assert!(RunOptions::text("hi").validate().is_ok());
    }

    #[test]
    fn attachment_alone_is_a_valid_prompt() {
        let options = RunOptions {
            attachments: vec![attachment("application/pdf", Some("spec.pdf"))],
            ..RunOptions::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn empty_attachment_data_is_rejected() {
        let options = RunOptions {
            prompt: "look at this".into(),
            attachments: vec![Attachment {
                data: String::new(),
                mime_type: "application/pdf".into(),
                file_name: Some("empty.pdf".into()),
            }],
            ..RunOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(CoreError::EmptyAttachment(Some(_)))
        ));
    }

    #[test]
    fn plain_prompt_stays_a_bare_string() {
        let content = RunOptions::text("just text").user_content();
        assert_eq!(content, UserMessageContent::Text("just text".into()));
    }

    #[test]
    fn legacy_images_gated_on_mime_family() {
        let options = RunOptions {
            prompt: "see attached".into(),
            legacy_images: vec![
                attachment("image/png", None),
                attachment("application/pdf", Some("not-an-image.pdf")),
            ],
            attachments: vec![attachment("image/jpeg", Some("photo.jpg"))],
            ..RunOptions::default()
        };

        let UserMessageContent::Blocks(blocks) = options.user_content() else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 4);
        assert!(matches!(blocks[0], UserContent::Text { .. }));
        assert!(matches!(blocks[1], UserContent::Image { .. }));
        // Legacy entry with a non-image MIME demotes to a document.
        assert!(matches!(blocks[2], UserContent::Document { .. }));
        // General attachments are documents even when the MIME is image/*.
        assert!(matches!(blocks[3], UserContent::Document { .. }));
    }
}
