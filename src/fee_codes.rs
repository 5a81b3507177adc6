//! Catalog of tertiary fee codes used by the reporting template.

pub const UNKNOWN_CATEGORY: &str = "未知类别";

const CATALOG: [(&str, &str); 38] = [
    // 1.1 service contracts
    ("1.1.1", "人工服务"),
    ("1.1.2", "维护服务"),
    ("1.1.3", "检测服务"),
    // 1.2 outsourced operations
    ("1.2.1", "外观类"),
    ("1.2.2", "保洁类"),
    ("1.2.3", "绿化类"),
    ("1.2.4", "消防类"),
    ("1.2.5", "安防类"),
    ("1.2.6", "工程类"),
    // 1.3 repairs and rectification
    ("1.3.1", "土建维修整改"),
    ("1.3.2", "电梯维修整改"),
    ("1.3.3", "消防维修整改"),
    ("1.3.4", "电气维修整改"),
    ("1.3.5", "暖通维修整改"),
    ("1.3.6", "弱电维修整改"),
    ("1.3.7", "给排水维修整改"),
    ("1.3.8", "景观维修整改"),
    ("1.3.9", "休闲设施整改"),
    ("1.3.10", "其他维修整改"),
    // 1.4 public utilities
    ("1.4.1", "公共水费及相关费"),
    ("1.4.2", "公共电费"),
    ("1.4.3", "公共燃气费"),
    ("1.4.4", "公共采暖费"),
    ("1.4.5", "公共其他能源费"),
    // 1.5 office
    ("1.5.1", "打印机租赁"),
    ("1.5.2", "办公耗材-合计"),
    ("1.5.3", "房租"),
    ("1.5.4", "物管能源费"),
    ("1.5.5", "网费"),
    ("1.5.6", "通讯费"),
    ("1.5.7", "差旅费"),
    ("1.5.8", "交通费"),
    ("1.5.9", "业务招待费"),
    // 1.6 opening and setup
    ("1.6.1", "开办物资购买"),
    ("1.6.2", "物业用房装修"),
    ("1.6.3", "物业用房开荒保洁"),
    ("1.6.4", "前期承诺整改"),
    ("1.6.5", "项目拓展费用"),
];

/// Category name for a tertiary fee code, or [`UNKNOWN_CATEGORY`].
pub fn category_name(code: &str) -> &'static str {
    CATALOG
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_CATEGORY)
}

pub fn known_codes() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|(code, _)| *code)
}

/// True for a three-segment, all-digit code such as `1.3.10`.
pub fn is_fee_code(text: &str) -> bool {
    let segments: Vec<&str> = text.split('.').collect();
    segments.len() == 3
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
}
