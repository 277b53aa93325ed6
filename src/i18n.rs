// i18n.rs — runtime UI strings for the desktop viewer
//
// Tables live in assets/i18n/<lang>.json as flat { "key": "text" } maps, looked up next to the
// executable first, then in the working directory. Missing keys fall back to English, then
// to the key itself. `{name}` placeholders are filled by `tr_with`.
//
// Language: --lang <code>, else PANO_LANG, else en.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const FALLBACK_LANG: &str = "en";

/// Languages offered in the menu: (code, native name).
pub const LANGUAGES: [(&str, &str); 2] = [("en", "English"), ("zh-Hans", "简体中文")];

#[derive(Debug, Clone, Default)]
struct Tables {
    lang: String,
    map: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl Tables {
    fn lookup(&self, key: &str) -> String {
        self.map
            .get(key)
            .or_else(|| self.fallback.get(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

static I18N: OnceCell<RwLock<Tables>> = OnceCell::new();

fn load_table(path: &Path) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(map) => Some(map),
        Err(e) => {
            log::warn!("ignoring malformed string table {}: {e}", path.display());
            None
        }
    }
}

fn find_lang_file(lang: &str) -> Option<PathBuf> {
    let file = format!("{lang}.json");
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    exe_dir
        .into_iter()
        .chain(std::iter::once(PathBuf::new()))
        .map(|dir| dir.join("assets").join("i18n").join(&file))
        .find(|p| p.exists())
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    find_lang_file(lang)
        .and_then(|p| load_table(&p))
        .unwrap_or_default()
}

/// Load (or reload) the tables for `lang`.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = load_lang(&lang);
    if map.is_empty() {
        log::warn!("no strings for language {lang}, using {FALLBACK_LANG}");
    }
    let fallback = if lang == FALLBACK_LANG {
        map.clone()
    } else {
        load_lang(FALLBACK_LANG)
    };
    let tables = Tables { lang, map, fallback };

    match I18N.get() {
        Some(lock) => {
            if let Ok(mut w) = lock.write() {
                *w = tables;
            }
        }
        None => {
            let _ = I18N.set(RwLock::new(tables));
        }
    }
}

pub fn current_lang() -> String {
    I18N.get()
        .and_then(|l| l.read().ok().map(|t| t.lang.clone()))
        .unwrap_or_else(|| FALLBACK_LANG.to_string())
}

pub fn tr(key: &str) -> String {
    match I18N.get().and_then(|l| l.read().ok()) {
        Some(t) => t.lookup(key),
        None => key.to_string(),
    }
}

fn substitute(mut text: String, args: &[(&str, String)]) -> String {
    for (name, value) in args {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    substitute(tr(key), args)
}

pub fn resolve_lang(args: &[String]) -> String {
    if let Some(pos) = args.iter().position(|a| a == "--lang") {
        if let Some(v) = args.get(pos + 1) {
            return v.clone();
        }
    }
    match std::env::var("PANO_LANG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => FALLBACK_LANG.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled_and_unknown_ones_kept() {
        let text = substitute(
            "zoom {level}% ({fov})".to_string(),
            &[("level", "50".to_string())],
        );
        assert_eq!(text, "zoom 50% ({fov})");
    }

    #[test]
    fn lookup_falls_back_then_returns_key() {
        let tables = Tables {
            lang: "zh-Hans".into(),
            map: HashMap::from([("menu.file".to_string(), "文件".to_string())]),
            fallback: HashMap::from([("menu.view".to_string(), "View".to_string())]),
        };
        assert_eq!(tables.lookup("menu.file"), "文件");
        assert_eq!(tables.lookup("menu.view"), "View");
        assert_eq!(tables.lookup("menu.nope"), "menu.nope");
    }

    #[test]
    fn cli_flag_wins() {
        let args = vec!["viewer".to_string(), "--lang".to_string(), "zh-Hans".to_string()];
        assert_eq!(resolve_lang(&args), "zh-Hans");
    }
}
