pub mod error;
pub mod tokenize;
pub mod vocab;

pub use error::TokenizerError;
pub use tokenize::{RuleTokenizer, SimpleTokenizer, Tokenizer, TokenizerKind};
pub use vocab::{Vocab, VocabConfig, PAD_ID, PAD_TOKEN, UNK_ID, UNK_TOKEN};
