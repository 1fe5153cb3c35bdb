use crate::chunking::Chunk;
use crate::models::ChatMessage;

const SYSTEM_TEMPLATE: &str = "
You are an assistant for question-answering tasks. Use the following pieces of retrieved context to answer the question.
If the question cannot be answered based on the context provided, say that there is no sufficient data to answer the question.
Keep the answer concise. Think step-by-step:
- start with identifying the main topic of the question
- then, find the most relevant information in the context, if there is no relevant information, say that there is no sufficient data to answer the question
- finally, provide a concise answer based on the context if the context is relevant, otherwise respond with: \"there is no sufficient data to answer the question\".
After considering the above steps and the context, provide a concise answer to the question.
Context: {context}
";

const HUMAN_TEMPLATE: &str = "Question: {input} \nAnswer:";

const CONTEXT_SEPARATOR: &str = "\n\n";
const SOURCE_SEPARATOR: &str = "\n\n------------------\n";

/// System instruction with the retrieved chunks, then the question
#[inline]
pub fn build_messages(chunks: &[&Chunk], question: &str) -> Vec<ChatMessage> {
    let context = chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    vec![
        ChatMessage::system(SYSTEM_TEMPLATE.replace("{context}", &context)),
        ChatMessage::user(HUMAN_TEMPLATE.replace("{input}", question)),
    ]
}

/// Retrieved chunk contents separated by a horizontal rule
#[inline]
pub fn format_sources(chunks: &[&Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}
