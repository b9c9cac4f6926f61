use llm::ChatMessage;
use rag_core::{ConversationMessage, Role};
use vector_store::SearchResult;

const GROUNDED_INSTRUCTIONS: &str = "You are an assistant that answers questions about the user's documents. \
Answer using only the numbered document excerpts below and cite them by number, for example [1]. \
If the excerpts do not contain the answer, say that the documents do not contain the answer.";

const NO_CONTEXT_INSTRUCTIONS: &str = "You are an assistant that answers questions about the user's documents. \
No relevant document excerpts were found for this question. \
Tell the user that the documents do not contain the answer.";

/// Formats retrieved chunks as numbered blocks, stopping before
/// `max_chars`. The first block is always kept, truncated if needed.
pub fn build_context(results: &[SearchResult], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0;

    for (i, result) in results.iter().enumerate() {
        let block = format!(
            "[{}] {} (page {})\n{}",
            i + 1,
            result.chunk.source_file,
            result.chunk.page,
            result.chunk.text
        );
        let separator = if i == 0 { 0 } else { 2 };
        let block_chars = block.chars().count();

        if i == 0 && block_chars > max_chars {
            context.extend(block.chars().take(max_chars));
            break;
        }
        if used + separator + block_chars > max_chars {
            break;
        }

        if i > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&block);
        used += separator + block_chars;
    }

    context
}

/// Assembles the system prompt, prior turns (oldest first) and the question.
pub fn build_messages(
    question: &str,
    history: &[ConversationMessage],
    results: &[SearchResult],
    max_context_chars: usize,
) -> Vec<ChatMessage> {
    let context = build_context(results, max_context_chars);
    let system = if context.is_empty() {
        NO_CONTEXT_INSTRUCTIONS.to_string()
    } else {
        format!("{}\n\nDocument excerpts:\n\n{}", GROUNDED_INSTRUCTIONS, context)
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    // Trimmed history can open on a reply; chat APIs want a user turn first.
    messages.extend(
        history
            .iter()
            .skip_while(|message| message.role == Role::Assistant)
            .map(ChatMessage::from),
    );
    messages.push(ChatMessage::user(question));
    messages
}
