//! HTML 片段的读取辅助函数

use scraper::{ElementRef, Selector};

use super::canonical::clean_text;

/// 解析固定的选择器字面量
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// 元素的全部文本，空白规范化
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// 第一个匹配元素的文本
pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

/// 所有匹配元素的文本（去掉空值）
pub(crate) fn all_texts(scope: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    scope
        .select(sel)
        .map(element_text)
        .filter(|s| !s.is_empty())
        .collect()
}

/// 第一个匹配元素的属性
pub(crate) fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 元素是否带有某个 class
pub(crate) fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// 沿祖先向上找第一个带指定 class 的元素
pub(crate) fn closest_with_class<'a>(el: ElementRef<'a>, class: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| has_class(*ancestor, class))
}

/// 第 n 层父元素
pub(crate) fn nth_parent(el: ElementRef<'_>, levels: usize) -> Option<ElementRef<'_>> {
    let mut current = el;
    for _ in 0..levels {
        current = current.parent().and_then(ElementRef::wrap)?;
    }
    Some(current)
}

/// 逗号分隔的标签文本拆成列表（如 "F/M, M/M"）
pub(crate) fn split_commas(values: Vec<String>) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_closest_and_nth_parent() {
        let html = Html::parse_fragment(
            r#"<div class="outer"><div class="header"><h4><a id="t" href="/works/1">T</a></h4></div></div>"#,
        );
        let link = html.select(&selector("a#t")).next().unwrap();

        let header = closest_with_class(link, "header").unwrap();
        assert!(has_class(header, "header"));
        assert!(closest_with_class(link, "missing").is_none());

        let grandparent = nth_parent(link, 2).unwrap();
        assert!(has_class(grandparent, "header"));
    }

    #[test]
    fn test_texts_are_cleaned() {
        let html = Html::parse_fragment(r#"<ul><li class="x"> A  <b>b</b> </li><li class="x"> </li></ul>"#);
        let root = html.root_element();
        assert_eq!(all_texts(root, &selector("li.x")), vec!["A b".to_string()]);
        assert_eq!(first_text(root, &selector("li.none")), None);
    }

    #[test]
    fn test_split_commas() {
        assert_eq!(
            split_commas(vec!["F/M, M/M".into(), "Gen".into()]),
            vec!["F/M".to_string(), "M/M".to_string(), "Gen".to_string()]
        );
    }
}
