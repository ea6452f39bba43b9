/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

/// 按空白切分 class / id 等令牌列表
pub fn split_tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(WHITESPACES).filter(|token| !token.is_empty())
}
