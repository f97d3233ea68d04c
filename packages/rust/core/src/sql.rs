//! SQL lowering of [`DataRequest`]s (SQLite dialect, positional `?`).
//!
//! Statement text is assembled only from fixed fragments; every value that
//! came from the user is pushed onto the parameter list.

use aulabot_shared::{Course, SqlQuery, SqlValue};

use crate::builder::{CourseFilter, DataRequest};

const STUDENTS: &str = "SELECT e.id, e.dni, e.nombre, e.apellido, e.fecha_nacimiento, \
     e.telefono_celular, e.email, e.curso_id, c.anio, c.division, c.grado, \
     esp.nombre AS especialidad, t.nombre AS turno \
     FROM estudiantes e \
     LEFT JOIN cursos c ON e.curso_id = c.id \
     LEFT JOIN especialidades esp ON c.especialidad_id = esp.id \
     LEFT JOIN turnos t ON c.turno_id = t.id";

const SEARCH_STUDENTS: &str = "SELECT e.id, e.nombre, e.apellido, e.dni, e.email, \
     e.telefono_celular, c.anio, c.division, \
     esp.nombre AS especialidad, t.nombre AS turno \
     FROM estudiantes e \
     JOIN cursos c ON e.curso_id = c.id \
     LEFT JOIN especialidades esp ON c.especialidad_id = esp.id \
     LEFT JOIN turnos t ON c.turno_id = t.id";

const GRADES: &str = "SELECT n.id, e.nombre, e.apellido, n.nota, n.cuatrimestre, \
     n.fecha_registro, n.observaciones, m.nombre AS materia, m.codigo AS materia_codigo \
     FROM notas n \
     JOIN materias m ON n.materia_id = m.id \
     JOIN estudiantes e ON n.estudiante_id = e.id";

const COURSE_STATISTICS: &str = "SELECT c.id, c.anio, c.division, esp.nombre AS especialidad, \
     (SELECT COUNT(*) FROM estudiantes e WHERE e.curso_id = c.id AND e.activo = 1) AS total_estudiantes, \
     (SELECT ROUND(AVG(n.nota), 2) FROM notas n JOIN estudiantes e ON n.estudiante_id = e.id \
       WHERE e.curso_id = c.id AND e.activo = 1) AS promedio_notas, \
     (SELECT COUNT(*) FROM llamados_atencion la JOIN estudiantes e ON la.estudiante_id = e.id \
       WHERE e.curso_id = c.id) AS total_llamados \
     FROM cursos c \
     LEFT JOIN especialidades esp ON c.especialidad_id = esp.id";

const ATTENTION_CALLS: &str = "SELECT la.id, la.fecha, la.motivo, la.sancion, la.observaciones, \
     e.nombre, e.apellido, c.anio, c.division \
     FROM llamados_atencion la \
     JOIN estudiantes e ON la.estudiante_id = e.id \
     JOIN cursos c ON e.curso_id = c.id";

const TEACHERS: &str = "SELECT p.id, p.dni, p.nombre, p.apellido, p.email, p.telefono_celular, \
     p.titulo, p.fecha_ingreso, p.activo \
     FROM profesores p";

const SCHEDULES: &str = "SELECT h.id, c.anio, c.division, m.nombre AS materia, \
     p.nombre AS profesor_nombre, p.apellido AS profesor_apellido, \
     h.dia, h.hora_inicio, h.hora_fin, h.aula \
     FROM horarios h \
     JOIN cursos c ON h.curso_id = c.id \
     JOIN materias m ON h.materia_id = m.id \
     JOIN profesores p ON h.profesor_id = p.id";

const SUBJECTS: &str = "SELECT m.id, m.nombre, m.codigo, m.horas_semanales, \
     esp.nombre AS especialidad, m.activo \
     FROM materias m \
     LEFT JOIN especialidades esp ON m.especialidad_id = esp.id";

const GENERAL_STATISTICS: &str = "SELECT \
     (SELECT COUNT(*) FROM estudiantes WHERE activo = 1) AS estudiantes, \
     (SELECT COUNT(*) FROM profesores WHERE activo = 1) AS profesores, \
     (SELECT COUNT(*) FROM cursos WHERE activo = 1) AS cursos, \
     (SELECT COUNT(*) FROM materias WHERE activo = 1) AS materias, \
     (SELECT COUNT(*) FROM notas) AS notas, \
     (SELECT COUNT(*) FROM llamados_atencion) AS llamados";

const ATTENDANCE_REPORT: &str = "SELECT e.nombre, e.apellido, c.anio, c.division, \
     COUNT(i.id) AS total_inasistencias, \
     SUM(CASE WHEN i.justificada = 1 THEN 1 ELSE 0 END) AS inasistencias_justificadas \
     FROM estudiantes e \
     JOIN cursos c ON e.curso_id = c.id \
     LEFT JOIN inasistencias i ON e.id = i.estudiante_id";

const COURSES: &str = "SELECT c.id, c.anio, c.division, c.grado, \
     esp.nombre AS especialidad, t.nombre AS turno, t.hora_inicio, t.hora_fin, \
     (SELECT COUNT(*) FROM estudiantes e WHERE e.curso_id = c.id AND e.activo = 1) AS total_estudiantes \
     FROM cursos c \
     LEFT JOIN especialidades esp ON c.especialidad_id = esp.id \
     LEFT JOIN turnos t ON c.turno_id = t.id";

const HEALTH: &str = "SELECT COUNT(*) AS total_estudiantes FROM estudiantes WHERE activo = 1";

/// Lower a request to a parameterized statement. Row bounds are applied
/// afterwards by the guard.
pub(crate) fn lower(request: &DataRequest) -> SqlQuery {
    let mut q = Statement::new();

    match request {
        DataRequest::Students { course, search } => {
            q.base(STUDENTS).filter("e.activo = 1");
            match course {
                CourseFilter::Any => {}
                CourseFilter::Id(id) => {
                    q.filter("e.curso_id = ?").bind(SqlValue::Integer(*id));
                }
                CourseFilter::Year(year) => {
                    q.filter("c.anio = ?").bind(SqlValue::Integer(i64::from(*year)));
                }
            }
            if let Some(term) = search {
                q.filter_like("(e.nombre || ' ' || e.apellido) LIKE ? ESCAPE '\\'", term);
            }
            q.order("e.apellido, e.nombre");
        }
        DataRequest::SearchStudents { term } => {
            q.base(SEARCH_STUDENTS).filter("e.activo = 1");
            let pattern = contains_pattern(term);
            q.filter("((e.nombre || ' ' || e.apellido) LIKE ? ESCAPE '\\' OR e.dni LIKE ? ESCAPE '\\')")
                .bind(SqlValue::Text(pattern.clone()))
                .bind(SqlValue::Text(pattern));
            q.order("e.apellido, e.nombre");
        }
        DataRequest::StudentGrades {
            student_id,
            subject,
        } => {
            q.base(GRADES)
                .filter("n.estudiante_id = ?")
                .bind(SqlValue::Integer(*student_id));
            if let Some(subject) = subject {
                q.filter_like("m.nombre LIKE ? ESCAPE '\\'", subject);
            }
            q.order("n.cuatrimestre DESC, n.fecha_registro DESC");
        }
        DataRequest::CourseStatistics { course_id } => {
            q.base(COURSE_STATISTICS).filter("c.activo = 1");
            if let Some(id) = course_id {
                q.filter("c.id = ?").bind(SqlValue::Integer(*id));
            }
            q.order("c.anio, c.division");
        }
        DataRequest::AttentionCalls { name, course } => {
            q.base(ATTENTION_CALLS);
            if let Some(name) = name {
                q.filter_like("(e.nombre || ' ' || e.apellido) LIKE ? ESCAPE '\\'", name);
            }
            if let Some(course) = course {
                q.course(course);
            }
            q.order("la.fecha DESC");
        }
        DataRequest::Teachers { name, subject } => {
            q.base(TEACHERS);
            if let Some(name) = name {
                q.filter_like("(p.nombre || ' ' || p.apellido) LIKE ? ESCAPE '\\'", name);
            }
            if let Some(subject) = subject {
                q.filter_like(
                    "EXISTS (SELECT 1 FROM profesor_materia pm JOIN materias m ON pm.materia_id = m.id \
                     WHERE pm.profesor_id = p.id AND m.nombre LIKE ? ESCAPE '\\')",
                    subject,
                );
            }
            q.order("p.activo DESC, p.apellido, p.nombre");
        }
        DataRequest::Schedules { course, subject } => {
            q.base(SCHEDULES).filter("c.activo = 1");
            if let Some(course) = course {
                q.course(course);
            }
            if let Some(subject) = subject {
                q.filter_like("m.nombre LIKE ? ESCAPE '\\'", subject);
            }
            q.order("h.dia, h.hora_inicio");
        }
        DataRequest::Subjects { specialty, name } => {
            q.base(SUBJECTS).filter("m.activo = 1");
            if let Some(specialty) = specialty {
                q.filter_like("esp.nombre LIKE ? ESCAPE '\\'", specialty);
            }
            if let Some(name) = name {
                q.filter_like("m.nombre LIKE ? ESCAPE '\\'", name);
            }
            q.order("m.nombre");
        }
        DataRequest::GeneralStatistics => {
            q.base(GENERAL_STATISTICS);
        }
        DataRequest::AttendanceReport => {
            q.base(ATTENDANCE_REPORT)
                .filter("e.activo = 1")
                .group("e.id HAVING COUNT(i.id) > 0")
                .order("total_inasistencias DESC");
        }
        DataRequest::Courses => {
            q.base(COURSES).filter("c.activo = 1").order("c.anio, c.division");
        }
        DataRequest::Health => {
            q.base(HEALTH);
        }
    }

    q.finish()
}

/// `%term%` with LIKE wildcards in the term escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Incremental statement assembly from fixed fragments.
struct Statement {
    base: &'static str,
    filters: Vec<&'static str>,
    group: Option<&'static str>,
    order: Option<&'static str>,
    params: Vec<SqlValue>,
}

impl Statement {
    fn new() -> Self {
        Self {
            base: "",
            filters: Vec::new(),
            group: None,
            order: None,
            params: Vec::new(),
        }
    }

    fn base(&mut self, base: &'static str) -> &mut Self {
        self.base = base;
        self
    }

    fn filter(&mut self, condition: &'static str) -> &mut Self {
        self.filters.push(condition);
        self
    }

    /// A `... LIKE ? ESCAPE '\'` condition bound to `%value%`.
    fn filter_like(&mut self, condition: &'static str, value: &str) -> &mut Self {
        self.filters.push(condition);
        self.params.push(SqlValue::Text(contains_pattern(value)));
        self
    }

    fn course(&mut self, course: &Course) -> &mut Self {
        self.filter("c.anio = ?")
            .bind(SqlValue::Integer(i64::from(course.year)));
        if let Some(division) = &course.division {
            self.filter("c.division = ?")
                .bind(SqlValue::Text(division.clone()));
        }
        self
    }

    fn bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        self
    }

    fn group(&mut self, clause: &'static str) -> &mut Self {
        self.group = Some(clause);
        self
    }

    fn order(&mut self, clause: &'static str) -> &mut Self {
        self.order = Some(clause);
        self
    }

    fn finish(self) -> SqlQuery {
        let mut text = self.base.to_string();
        if !self.filters.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&self.filters.join(" AND "));
        }
        if let Some(group) = self.group {
            text.push_str(" GROUP BY ");
            text.push_str(group);
        }
        if let Some(order) = self.order {
            text.push_str(" ORDER BY ");
            text.push_str(order);
        }
        SqlQuery {
            text,
            params: self.params,
        }
    }
}
