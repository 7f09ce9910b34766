use chrono::NaiveDate;

const RAW_JSON_ONLY: &str = "IMPORTANT: Your entire response must be only the raw JSON text. \
Do not include any introductory phrases like \"Here is the JSON\" or markdown code fences like ```json.";

/// Prompt for a planning to-do list relative to the wedding date.
pub fn task_prompt(wedding_date: NaiveDate) -> String {
    format!(
        "You are an expert wedding planner. Based on a wedding date of {}, generate a comprehensive \
list of to-do items for planning a wedding. Return the response as a valid JSON array of objects. \
Each object must have a 'task' (string) and a 'dueDate' (string in 'YYYY-MM-DD' format) property. \
The 'dueDate' should be calculated relative to the wedding date. Create at least 15 tasks. \
Ensure the entire response is only the JSON array, with no extra text or markdown formatting. {}",
        wedding_date.format("%Y-%m-%d"),
        RAW_JSON_ONLY
    )
}

/// Prompt for venue suggestions near `location` under `budget`.
pub fn venue_prompt(location: &str, budget: &str) -> String {
    format!(
        r#"Find 5 wedding venues near "{}" for a budget under ${}. IMPORTANT: Respond with only a valid JSON object. The JSON object must have a single root key "venues", which is an array of objects. Each venue object in the array must include these exact keys: "name" (string), "location" (string), "aesthetic_description" (string), "estimated_price" (number), "website_url" (string), and "image_url" (string, must be a direct hotlink to a .jpg, .png, or .webp file). Do not include any text, titles, or markdown before or after the JSON object."#,
        location, budget
    )
}

/// Prompt for a five-colour palette anchored on `base`.
pub fn palette_prompt(base: &str, theme: &str) -> String {
    format!(
        r#"You are an expert wedding color palette designer. Based on the primary color "{}" for a "{}" themed wedding, generate a complementary FIVE-COLOR palette. The palette should consist of: the primary base color, a secondary color, two different accent colors, and one neutral color. Return the response as a valid JSON object with a single key "palette", which is an array of EXACTLY 5 hex color code strings. The first color in the array must be the provided base color. {}"#,
        base, theme, RAW_JSON_ONLY
    )
}

/// Follow-up appended to the original prompt after an unusable answer.
pub(crate) fn repair_prompt(original: &str, previous_output: &str, error: &str) -> String {
    format!(
        "{}\n\nYour previous output was:\n{}\n\nIt had an error: {}\n\nPlease fix the JSON and try again. Output ONLY the corrected JSON.",
        original, previous_output, error
    )
}
