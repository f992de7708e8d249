//! One-shot system-prompt rendering in the child environment.
//!
//! `${VAR}` markers substitute environment variables as the sandbox sees
//! them; `{{hostname}}` resolves to the sandbox hostname. Unknown variables
//! render empty. Rendering happens once per session; the result is persisted
//! back to the record with the evaluated flag set.

pub fn render(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            if let Some(end) = chars[i + 2..].iter().position(|c| *c == '}') {
                let name: String = chars[i + 2..i + 2 + end].iter().collect();
                out.push_str(&std::env::var(&name).unwrap_or_default());
                i += end + 3;
                continue;
            }
        }
        if chars[i] == '{' && i + 1 < chars.len() && chars[i + 1] == '{' {
            if let Some(end) = find_double_close(&chars, i + 2) {
                let name: String = chars[i + 2..end].iter().collect();
                out.push_str(&builtin_marker(name.trim()));
                i = end + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn find_double_close(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len().saturating_sub(1)).find(|&j| chars[j] == '}' && chars[j + 1] == '}')
}

fn builtin_marker(name: &str) -> String {
    match name {
        "hostname" => hostname(),
        "cwd" => std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        other => std::env::var(other).unwrap_or_default(),
    }
}

fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME")
        && !name.is_empty()
    {
        return name;
    }
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        if unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) } == 0 {
            let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
            return String::from_utf8_lossy(&buf[..end]).into_owned();
        }
    }
    "localhost".to_string()
}
