use path_clean::PathClean;
use std::path::{Path, PathBuf};

pub fn staged_path<H: AsRef<str>>(staging_dir: &Path, id: H) -> PathBuf {
    staging_dir.join(format!("{}.tmp", id.as_ref())).clean()
}

/// `UserAvatar` -> `user_avatars`, `category` -> `categories`.
pub fn tableize(kind: &str) -> String {
    let mut snake = String::with_capacity(kind.len() + 4);
    for (i, c) in kind.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !snake.ends_with('_') {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            snake.push('_');
        } else {
            snake.push(c);
        }
    }
    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s') && !word.ends_with("ss") {
        return word.to_string();
    }
    let consonant_y = word.ends_with('y')
        && !word[..word.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with(['x', 'z'])
        || word.ends_with("ss")
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}
