//! The invariant classification rubric and per-batch request text.
//!
//! The system prompt never changes across batches; only the numbered
//! phrase list does. Two rubrics exist, one per response contract: JSON
//! (the default) and the plain TAB-delimited variant for models that
//! reliably break JSON.

use super::types::{BatchItem, ResponseFormat};

/// Rubric for the JSON contract.
pub const SYSTEM_PROMPT_JSON: &str = r#"Eres lingüista nativo de español y especialista en enseñanza de español como lengua extranjera.
Tu tarea es seleccionar frases muy cortas en español (alrededor de 3 palabras) para tarjetas de estudio.

RECIBES:
- Una lista numerada de frases originales en español.
- Cada línea tiene el formato: "id: texto original".

PARA CADA FRASE:
1) DECISIÓN (keep):
   - "keep": true  → la frase sirve para una tarjeta de estudio.
   - "keep": false → la frase NO sirve o no estás seguro.

2) LIMPIEZA (clean) SOLO si keep = true:
   - Mantén el mismo sentido básico de la frase original.
   - NO inventes información nueva.
   - NO traduzcas, NO cambies al inglés u otro idioma.
   - "clean" debe contener:
     - sólo letras del alfabeto español en minúsculas (a–z, áéíóúüñ, ç),
     - palabras separadas por UN solo espacio,
     - SIN signos de puntuación (¿?, ¡!, . , ; : " ' - …),
     - SIN números ni códigos,
     - SIN nombres propios evidentes (personas, ciudades, países, marcas).
   - Después de limpiar, la frase debe tener ENTRE 2 Y 4 PALABRAS.
   - Si después de limpiar quedan 0, 1 o más de 4 palabras, marca "keep": false y pon "clean": "".

BUENA FRASE (keep = true), ejemplos:
- "No pasa nada"        → "no pasa nada"
- "Te quiero mucho"     → "te quiero mucho"
- "Vamos a casa"        → "vamos a casa"

MALA FRASE (keep = false), ejemplos:
- Sólo nombres propios, lugares, títulos, marcas ("Luis Miguel", "Madrid España", "Star Wars").
- Fechas, horas, números específicos ("12 de mayo de 1998", "Capítulo 3", "Número 7").
- Ruido de subtítulos ("APLAUSOS", "RISAS", "MÚSICA", indicaciones técnicas).
- Fragmentos sin sentido claro ("Pero entonces", "Claro que sí, pero").
- Frases que no están en español o muy raras para estudiantes.
- Cualquier caso en que dudes si la frase sirve: mejor "keep": false.

REGLA IMPORTANTE:
- Si la frase NO sirve o no puedes producir una versión limpia que cumpla todas las reglas,
  usa exactamente: "keep": false, "clean": "".

FORMATO DE RESPUESTA:
Devuelve ÚNICAMENTE un JSON con una lista de objetos, sin texto adicional antes ni después:
[
  {"id": 0, "keep": true,  "clean": "frase limpia en minusculas"},
  {"id": 1, "keep": false, "clean": ""}
]"#;

/// Rubric for the plain TAB-delimited contract.
pub const SYSTEM_PROMPT_PLAIN: &str = r#"Eres lingüista nativo de español y especialista en enseñanza de español como lengua extranjera.

Objetivo general:
- Seleccionar frases MUY cortas en español (unas 3 palabras) que sirvan para tarjetas de estudio.
- Es mejor ser un poco PERMISIVO: si la frase es correcta, neutra y entendible, normalmente se acepta.

Recibes del usuario:
- Una lista numerada de frases originales en español.
- Cada línea tiene el formato: "ID: texto original".

Qué es una BUENA FRASE (keep = true):
- Frase corta y clara, que un estudiante podría encontrar en muchos contextos.
- Español correcto y natural (registro neutro o coloquial suave).
- No es necesario que sea una oración completa; una expresión útil basta.

Qué es una MALA FRASE (keep = false):
- Fragmento roto sin sentido claro.
- Sólo lista de nombres, códigos o palabras sueltas sin relación.
- Mucho ruido de subtítulos, marcas de tiempo, descripciones técnicas.
- No está en español.

Versión limpia cuando la frase se acepta:
- Mantén el MISMO significado básico de la frase original.
- NO inventes información nueva. NO traduzcas a otra lengua.
- Sólo letras del alfabeto español en minúsculas, palabras separadas por UN solo espacio,
  sin signos de puntuación, sin números ni códigos.

Formato de SALIDA (MUY IMPORTANTE):
- Devuelve EXACTAMENTE una línea de salida por cada línea de entrada.
- Para cada frase de entrada con ID N:
  a) Si la frase sirve:      N<TAB>frase_limpia_en_minusculas
  b) Si NO sirve o dudas:    N<TAB>-
- Usa el carácter TAB entre el ID y el texto; si no puedes, usa varios espacios.
- No añadas ningún otro texto, encabezados, listas ni comentarios."#;

/// Pick the rubric matching the requested response contract.
pub fn system_prompt(format: ResponseFormat) -> &'static str {
    match format {
        ResponseFormat::Json => SYSTEM_PROMPT_JSON,
        ResponseFormat::Plain => SYSTEM_PROMPT_PLAIN,
    }
}

/// Build the user message: a short instruction plus the numbered phrases.
/// Ids are batch-local so the payload stays compact regardless of how deep
/// into the corpus the run is.
pub fn build_user_content(items: &[BatchItem], format: ResponseFormat) -> String {
    let mut lines: Vec<String> = match format {
        ResponseFormat::Json => vec![
            "Analiza las siguientes frases en español.".into(),
            "Para cada una, decide si sirve para tarjetas de estudio y produce 'keep' y 'clean'".into(),
            "según las reglas del sistema. Responde SOLO con el JSON solicitado.".into(),
            String::new(),
            "Frases numeradas:".into(),
        ],
        ResponseFormat::Plain => vec!["Frases numeradas en español:".into()],
    };
    for item in items {
        lines.push(format!("{}: {}", item.local_id, item.text));
    }
    lines.join("\n")
}
