//! Query tokenizer / 查询分词器
//!
//! Lower-case + whitespace split. Stemming is left to the FTS5 tokenizer
//! configured on the search vector, never done here.

/// Tokenize a raw search query / 对搜索查询进行分词
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Token length in characters, the unit both strategies measure against
pub fn token_len(token: &str) -> usize {
    token.chars().count()
}

/// Tokens at least `min_len` characters long, in query order / 过滤过短的词
pub fn tokens_at_least(tokens: &[String], min_len: usize) -> Vec<&str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|t| token_len(t) >= min_len)
        .collect()
}
