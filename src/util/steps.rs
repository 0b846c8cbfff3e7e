use crate::model::test_case::TestStep;

/// Escape text for inclusion in XML element content or attributes.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize steps into the `Microsoft.VSTS.TCM.Steps` field format.
///
/// Step ids start at 2, matching what the web editor writes; `last` must name
/// the highest step id.
pub fn format_steps(steps: &[TestStep]) -> String {
    let last = steps.len() + 1;
    let mut xml = format!(r#"<steps id="0" last="{last}">"#);
    for (i, step) in steps.iter().enumerate() {
        let kind = if step.expected_result.trim().is_empty() {
            "ActionStep"
        } else {
            "ValidateStep"
        };
        xml.push_str(&format!(
            r#"<step id="{}" type="{kind}"><parameterizedString isformatted="true">{}</parameterizedString><parameterizedString isformatted="true">{}</parameterizedString><description/></step>"#,
            i + 2,
            xml_escape(&step.action),
            xml_escape(&step.expected_result),
        ));
    }
    xml.push_str("</steps>");
    xml
}
