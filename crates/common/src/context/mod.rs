//! Grounded answer generation
//!
//! Turns a query plus a handful of retrieved chunks into a natural-language
//! answer, a retrieval-based confidence score and follow-up questions.

mod synthesizer;

pub use synthesizer::{
    calculate_confidence, AnswerLength, AnswerSynthesizer, SynthesisContext, SynthesizedAnswer,
    FALLBACK_ANSWER, MAX_CONTEXT_CHUNKS, NOT_ENOUGH_INFORMATION,
};
