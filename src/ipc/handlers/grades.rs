use crate::grading::{gpa_for, grade_for, Grade, Mark, BANDS};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_compute(_state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let raw = req
        .params
        .get("marks")
        .ok_or_else(|| HandlerErr::bad_params("missing marks"))?;
    let mark = Mark::from_json(raw)?;
    let grade = grade_for(mark);
    Ok(json!({
        "marks": mark,
        "grade": grade,
        "label": grade.label(),
        "point": grade.point(),
    }))
}

fn handle_gpa(_state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let items = req
        .params
        .get("grades")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("grades must be a list of grade symbols"))?;
    let mut grades = Vec::with_capacity(items.len());
    for item in items {
        let symbol = item
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("grades must be a list of grade symbols"))?;
        grades.push(symbol.parse::<Grade>()?);
    }
    let gpa = gpa_for(grades.iter().copied());
    Ok(json!({ "gpa": gpa, "display": gpa.to_string(), "count": grades.len() }))
}

fn handle_scale(_state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let bands: Vec<serde_json::Value> = BANDS
        .iter()
        .map(|(min, g)| {
            json!({
                "minMarks": *min as f64 / 100.0,
                "grade": g,
                "label": g.label(),
                "point": g.point(),
            })
        })
        .collect();
    Ok(json!({ "bands": bands }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.compute" => Some(respond(&req.id, handle_compute(state, req))),
        "grades.gpa" => Some(respond(&req.id, handle_gpa(state, req))),
        "grades.scale" => Some(respond(&req.id, handle_scale(state, req))),
        _ => None,
    }
}
