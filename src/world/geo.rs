//! Geographic name dictionaries shared by the hierarchy consolidator and the
//! foreign-novel heuristic.

use std::collections::HashMap;
use std::sync::OnceLock;

pub const PROVINCE_TIER: &str = "continent";
pub const ROOT_TIER: &str = "world";

pub const PROVINCE_PREFIXES: &[&str] = &[
    "山东", "山西", "河北", "河南", "河东", "江西", "江南", "江北", "浙西", "浙东", "两浙",
    "淮西", "淮东", "陕西", "关西", "湖南", "湖北", "广东", "广西", "福建", "四川", "北地",
];

pub const LOCATION_SUFFIXES: &[&str] = &[
    "城外", "城里", "城内", "城中", "城下", "城边", "地面", "地界", "境内", "境界", "界上",
    "界", "管下", "管内", "附近", "一带", "周边", "以东", "以西", "以南", "以北", "东门外",
    "西门外", "南门外", "北门外", "门外", "门内", "城东", "城西", "城南", "城北", "上东边",
];

pub const VARIANT_SUFFIXES: &[&str] = &["城", "城池"];

pub const PROVINCES: &[&str] = &[
    "山东", "山西", "河北", "河南", "河东", "江西", "江南", "江北", "浙西", "浙东", "两浙",
    "淮西", "淮东", "陕西", "关西", "湖南", "湖北", "广东", "广西", "福建", "四川", "北地",
    "京畿", "中原",
];

const SUB_LOCATION_ENDINGS: &[&str] = &[
    "门外", "门内", "门前", "门后", "门头", "前", "后面", "旁边", "上面", "下面", "里", "里面",
    "内", "外", "外面", "中", "中间", "上", "下", "边", "头", "房内", "厅上", "堂内", "阁儿里",
    "阁儿内", "阁内", "墙下", "墙外", "墙边", "树下", "树林",
];

const SUB_LOCATION_PATTERNS: &[&str] = &["粪窖", "打麦场", "葡萄架", "化人场", "牢城营"];

const GEO_SUFFIXES: &[char] = &[
    '州', '府', '县', '郡', '路', '京', '城', '镇', '村', '庄', '寨', '营', '驿', '关', '隘',
    '山', '岭', '峰', '岗', '冈', '江', '河', '湖', '海', '泊', '溪', '港', '寺', '庙', '观',
    '庵', '祠', '国',
];

fn prefecture_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("济州", "山东"),
            ("东京", "京畿"),
            ("汴京", "京畿"),
            ("汴梁", "京畿"),
            ("太原", "河东"),
            ("杭州", "两浙"),
            ("苏州", "两浙"),
            ("大名府", "河北"),
            ("青州", "山东"),
            ("郓州", "山东"),
            ("沧州", "河北"),
            ("华州", "关西"),
            ("渭州", "关西"),
            ("延安府", "陕西"),
            ("江州", "江南"),
            ("蓟州", "河北"),
            ("登州", "山东"),
            ("高唐州", "山东"),
            ("北京", "河北"),
            ("南京", "江南"),
        ])
    })
}

fn mountains_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("五台山", "河东"),
            ("泰山", "山东"),
            ("梁山", "山东"),
            ("梁山泊", "山东"),
            ("华山", "关西"),
            ("二龙山", "山东"),
            ("桃花山", "山东"),
            ("少华山", "关西"),
        ])
    })
}

fn rivers_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("黄河", "京畿"),
            ("扬子江", "江南"),
            ("渭河", "关西"),
            ("潞水", "河东"),
        ])
    })
}

pub fn prefecture_to_province(name: &str) -> Option<&'static str> {
    prefecture_table().get(name).copied()
}

pub fn mountain_to_province(name: &str) -> Option<&'static str> {
    mountains_table().get(name).copied()
}

pub fn river_to_province(name: &str) -> Option<&'static str> {
    rivers_table().get(name).copied()
}

/// Fuzzy geo lookup: exact table hit first, then suffix-stripped retry
/// against 府/州/县/城, in that order.
pub fn geo_lookup(name: &str) -> Option<&'static str> {
    if let Some(p) = prefecture_to_province(name)
        .or_else(|| mountain_to_province(name))
        .or_else(|| river_to_province(name))
    {
        return Some(p);
    }
    for suffix in ["府", "州", "县", "城"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            if let Some(p) = prefecture_to_province(stripped) {
                return Some(p);
            }
        }
    }
    None
}

/// Longest-prefix match against [`PROVINCE_PREFIXES`], skipping a trailing
/// suffix that would make the compound meaningless on its own
/// (路上/一带/方面/地方).
pub fn parse_compound_name(name: &str) -> Option<(&'static str, String)> {
    const SKIP_SUFFIX: &[&str] = &["路上", "一带", "方面", "地方"];
    if SKIP_SUFFIX.iter().any(|s| name.ends_with(s)) {
        return None;
    }
    let mut best: Option<(&'static str, usize)> = None;
    for prefix in PROVINCE_PREFIXES {
        if name.starts_with(prefix) && name.chars().count() > prefix.chars().count() {
            let len = prefix.chars().count();
            if best.map(|(_, l)| len > l).unwrap_or(true) {
                best = Some((prefix, len));
            }
        }
    }
    best.map(|(prefix, len)| {
        let local_part: String = name.chars().skip(len).collect();
        (*prefix, local_part)
    })
}

/// Longest-suffix match against [`LOCATION_SUFFIXES`]; the base (prefix)
/// must be a known location for the match to count.
pub fn parse_location_suffix(
    name: &str,
    known_locations: &std::collections::HashSet<String>,
) -> Option<String> {
    let mut best: Option<&str> = None;
    for suffix in LOCATION_SUFFIXES {
        if name.ends_with(suffix) && name.chars().count() > suffix.chars().count() {
            if best.map(|b| suffix.len() > b.len()).unwrap_or(true) {
                best = Some(suffix);
            }
        }
    }
    let suffix = best?;
    let base: String = name.chars().take(name.chars().count() - suffix.chars().count()).collect();
    if known_locations.contains(&base) {
        Some(base)
    } else {
        None
    }
}

pub fn parse_variant_name(name: &str, known_locations: &std::collections::HashSet<String>) -> Option<String> {
    for suffix in VARIANT_SUFFIXES {
        if let Some(base) = name.strip_suffix(suffix) {
            if !base.is_empty() && known_locations.contains(base) {
                return Some(base.to_string());
            }
        }
    }
    None
}

pub fn is_geographic_name(name: &str) -> bool {
    name.chars().last().map(|c| GEO_SUFFIXES.contains(&c)).unwrap_or(false)
}

/// Short-name heuristic for sub-locations (rooms, corners of a compound)
/// that should never become independent hierarchy roots. 2-char names are
/// exempted when they're a known province/city name.
pub fn is_sub_location_name(name: &str) -> bool {
    let len = name.chars().count();
    if len == 2 && PROVINCES.contains(&name) {
        return false;
    }
    if len <= 2 {
        return true;
    }
    SUB_LOCATION_ENDINGS.iter().any(|e| name.ends_with(e))
        || SUB_LOCATION_PATTERNS.iter().any(|p| name.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_lookup_exact_prefecture() {
        assert_eq!(geo_lookup("东京"), Some("京畿"));
    }

    #[test]
    fn geo_lookup_suffix_stripped_retry() {
        assert_eq!(geo_lookup("济州府"), Some("山东"));
    }

    #[test]
    fn parse_compound_splits_province_prefix() {
        let (province, local) = parse_compound_name("山东济州").unwrap();
        assert_eq!(province, "山东");
        assert_eq!(local, "济州");
    }

    #[test]
    fn sub_location_detects_room_suffix() {
        assert!(is_sub_location_name("后花园里"));
        assert!(!is_sub_location_name("山东"));
    }
}
